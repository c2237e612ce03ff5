use super::messages::{Pake1, Pake2, Pake3, PbkdfParamRequest, PbkdfParamResponse};
use super::{DEFAULT_PASSCODE_ID, pase_context, validate_pbkdf_parameters};
use crate::error::HandshakeError;
use crate::exchange::MessageExchange;
use crate::protocol::{SecureChannelOpcode, SecureChannelStatus, StatusReport};
use crate::secure_channel::{abort_handshake, expect_opcode};
use crate::session::{NewSecureSession, Session, SessionTable};
use crate::tlv::TlvMessage;
use hearth_crypto::constant_time::ct_eq;
use hearth_crypto::random::random_32;
use hearth_crypto::spake2p::{PasscodeKeys, Spake2p};
use std::sync::Arc;
use tracing::info;

/// PASE initiator (commissioner side).
#[derive(Debug, Clone)]
pub struct PaseClient {
    sessions: Arc<SessionTable>,
}

impl PaseClient {
    /// Create an initiator allocating sessions from `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SessionTable>) -> Self {
        Self { sessions }
    }

    /// Run PASE on a freshly initiated secure channel exchange over the
    /// unsecured session. The exchange is closed on return.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::VerifierMismatch`] when the device proves a
    /// different passcode, `Exchange(PeerStatus)` when the device rejects
    /// ours, and decoding, crypto or transport failures otherwise.
    pub async fn establish(
        &self,
        mut exchange: MessageExchange,
        passcode: u32,
    ) -> Result<Arc<Session>, HandshakeError> {
        let mut reserved = None;
        let result = self.initiate(&mut exchange, passcode, &mut reserved).await;
        if let Err(e) = &result {
            abort_handshake(&exchange, e, "PASE").await;
            if let Some(id) = reserved {
                self.sessions.release_session_id(id);
            }
        }
        exchange.close().await;
        result
    }

    async fn initiate(
        &self,
        exchange: &mut MessageExchange,
        passcode: u32,
        reserved: &mut Option<u16>,
    ) -> Result<Arc<Session>, HandshakeError> {
        let initiator_session_id = self.sessions.allocate_session_id()?;
        *reserved = Some(initiator_session_id);

        let request = PbkdfParamRequest {
            initiator_random: random_32()?,
            initiator_session_id,
            passcode_id: DEFAULT_PASSCODE_ID,
            has_pbkdf_parameters: false,
            mrp_parameters: Some(self.sessions.parameters()),
        };
        let request_bytes = request.encode()?;
        exchange
            .send(SecureChannelOpcode::PbkdfParamRequest.as_u8(), &request_bytes)
            .await?;

        let response_message = exchange.next_message().await?;
        expect_opcode(&response_message, SecureChannelOpcode::PbkdfParamResponse)?;
        let response = PbkdfParamResponse::decode(&response_message.payload)?;
        if !ct_eq(&response.initiator_random, &request.initiator_random) {
            return Err(HandshakeError::RandomMismatch);
        }
        let pbkdf = response
            .pbkdf_parameters
            .as_ref()
            .ok_or(HandshakeError::InvalidParameter("missing pbkdf parameters"))?;
        validate_pbkdf_parameters(&pbkdf.salt, pbkdf.iterations)?;

        let context = pase_context(&request_bytes, &response_message.payload);
        let keys = PasscodeKeys::derive(passcode, &pbkdf.salt, pbkdf.iterations)?;
        let spake = Spake2p::new(&context, keys.w0);
        let x = spake.compute_x()?;
        exchange
            .send(SecureChannelOpcode::Pake1.as_u8(), &Pake1 { x }.encode()?)
            .await?;

        let pake2_message = exchange.next_message().await?;
        expect_opcode(&pake2_message, SecureChannelOpcode::Pake2)?;
        let pake2 = Pake2::decode(&pake2_message.payload)?;
        let secrets = spake.compute_secret_and_verifiers_from_y(&keys.w1, &x, &pake2.y)?;
        if !ct_eq(&pake2.verifier, &secrets.h_bx) {
            return Err(HandshakeError::VerifierMismatch);
        }

        let pake3 = Pake3 {
            verifier: secrets.h_ay,
        };
        exchange
            .send(SecureChannelOpcode::Pake3.as_u8(), &pake3.encode()?)
            .await?;

        let status_message = exchange.next_message().await?;
        expect_opcode(&status_message, SecureChannelOpcode::StatusReport)?;
        let status = StatusReport::decode(&status_message.payload)
            .map_err(|e| HandshakeError::Exchange(e.into()))?;
        if status.secure_channel_status() != Some(SecureChannelStatus::SessionEstablishmentSuccess) {
            return Err(HandshakeError::UnexpectedStatus(status));
        }

        let parameters = response
            .mrp_parameters
            .unwrap_or_else(|| self.sessions.parameters());
        let session = self.sessions.create_secure_session(NewSecureSession {
            local_session_id: initiator_session_id,
            peer_session_id: response.responder_session_id,
            shared_secret: &secrets.ke,
            salt: &[],
            is_initiator: true,
            local_node_id: 0,
            peer_node_id: 0,
            parameters,
        })?;
        *reserved = None;
        info!(
            peer = %exchange.peer(),
            session = initiator_session_id,
            "PASE session established"
        );
        Ok(session)
    }
}
