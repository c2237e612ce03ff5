use super::messages::{Pake1, Pake2, Pake3, PbkdfParamRequest, PbkdfParamResponse, PbkdfParameters};
use super::{DEFAULT_PASSCODE_ID, pase_context, validate_passcode, validate_pbkdf_parameters};
use crate::codec::Message;
use crate::error::HandshakeError;
use crate::exchange::MessageExchange;
use crate::protocol::{SecureChannelOpcode, StatusReport};
use crate::secure_channel::{abort_handshake, expect_opcode};
use crate::session::{NewSecureSession, Session, SessionTable};
use crate::tlv::TlvMessage;
use hearth_crypto::constant_time::ct_eq;
use hearth_crypto::random::random_32;
use hearth_crypto::spake2p::{PasscodeKeys, Scalar, Spake2p};
use std::sync::Arc;
use tracing::{debug, info};

/// PASE responder holding the passcode verifier of a commissionable device.
pub struct PaseServer {
    sessions: Arc<SessionTable>,
    w0: Scalar,
    l: [u8; 65],
    pbkdf: PbkdfParameters,
}

impl std::fmt::Debug for PaseServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaseServer")
            .field("iterations", &self.pbkdf.iterations)
            .finish_non_exhaustive()
    }
}

impl PaseServer {
    /// Derive the verifier for `passcode` under the given PBKDF2 parameters.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidParameter`] for an invalid passcode,
    /// salt length or iteration count.
    pub fn new(
        sessions: Arc<SessionTable>,
        passcode: u32,
        salt: Vec<u8>,
        iterations: u32,
    ) -> Result<Self, HandshakeError> {
        validate_passcode(passcode)?;
        validate_pbkdf_parameters(&salt, iterations)?;
        let keys = PasscodeKeys::derive(passcode, &salt, iterations)?;
        Ok(Self {
            sessions,
            w0: keys.w0,
            l: keys.l()?,
            pbkdf: PbkdfParameters { iterations, salt },
        })
    }

    /// Run the responder side on an exchange whose first message is
    /// `PbkdfParamRequest`. The exchange is closed on return.
    ///
    /// # Errors
    ///
    /// Returns the failure after reporting it to the peer where applicable.
    pub async fn handle(
        &self,
        mut exchange: MessageExchange,
        request: Message,
    ) -> Result<Arc<Session>, HandshakeError> {
        let mut reserved = None;
        let result = self.respond(&mut exchange, &request, &mut reserved).await;
        if let Err(e) = &result {
            abort_handshake(&exchange, e, "PASE").await;
            if let Some(id) = reserved {
                self.sessions.release_session_id(id);
            }
        }
        exchange.close().await;
        result
    }

    async fn respond(
        &self,
        exchange: &mut MessageExchange,
        request_message: &Message,
        reserved: &mut Option<u16>,
    ) -> Result<Arc<Session>, HandshakeError> {
        expect_opcode(request_message, SecureChannelOpcode::PbkdfParamRequest)?;
        let request_bytes = &request_message.payload;
        let request = PbkdfParamRequest::decode(request_bytes)?;
        if request.passcode_id != DEFAULT_PASSCODE_ID {
            return Err(HandshakeError::InvalidPasscodeId(request.passcode_id));
        }

        let responder_session_id = self.sessions.allocate_session_id()?;
        *reserved = Some(responder_session_id);
        let response = PbkdfParamResponse {
            initiator_random: request.initiator_random,
            responder_random: random_32()?,
            responder_session_id,
            pbkdf_parameters: (!request.has_pbkdf_parameters).then(|| self.pbkdf.clone()),
            mrp_parameters: Some(self.sessions.parameters()),
        };
        let response_bytes = response.encode()?;
        exchange
            .send(SecureChannelOpcode::PbkdfParamResponse.as_u8(), &response_bytes)
            .await?;
        debug!(peer = %exchange.peer(), responder_session_id, "sent PbkdfParamResponse");

        let context = pase_context(request_bytes, &response_bytes);
        let spake = Spake2p::new(&context, self.w0);
        let y = spake.compute_y()?;

        let pake1_message = exchange.next_message().await?;
        expect_opcode(&pake1_message, SecureChannelOpcode::Pake1)?;
        let pake1 = Pake1::decode(&pake1_message.payload)?;
        let secrets = spake.compute_secret_and_verifiers_from_x(&self.l, &pake1.x, &y)?;

        let pake2 = Pake2 {
            y,
            verifier: secrets.h_bx,
        };
        exchange
            .send(SecureChannelOpcode::Pake2.as_u8(), &pake2.encode()?)
            .await?;

        let pake3_message = exchange.next_message().await?;
        expect_opcode(&pake3_message, SecureChannelOpcode::Pake3)?;
        let pake3 = Pake3::decode(&pake3_message.payload)?;
        if !ct_eq(&pake3.verifier, &secrets.h_ay) {
            return Err(HandshakeError::VerifierMismatch);
        }

        let parameters = request
            .mrp_parameters
            .unwrap_or_else(|| self.sessions.parameters());
        let session = self.sessions.create_secure_session(NewSecureSession {
            local_session_id: responder_session_id,
            peer_session_id: request.initiator_session_id,
            shared_secret: &secrets.ke,
            salt: &[],
            is_initiator: false,
            local_node_id: 0,
            peer_node_id: 0,
            parameters,
        })?;
        *reserved = None;

        if let Err(e) = exchange
            .send_status(&StatusReport::secure_channel_success())
            .await
        {
            // the peer never learns of success; do not keep a session it lacks
            self.sessions.remove(responder_session_id);
            return Err(e.into());
        }
        info!(
            peer = %exchange.peer(),
            session = responder_session_id,
            "PASE session established"
        );
        Ok(session)
    }
}
