use super::fabric::Fabric;
use super::messages::{Sigma1, Sigma2, Sigma3, TbeData2, TbeData3, TbsData};
use super::{SIGMA2_NONCE, SIGMA3_NONCE, open, seal, session_salt, sigma2_key, sigma3_key};
use crate::error::HandshakeError;
use crate::exchange::MessageExchange;
use crate::protocol::{SecureChannelOpcode, SecureChannelStatus, StatusReport};
use crate::secure_channel::{abort_handshake, expect_opcode};
use crate::session::{NewSecureSession, Session, SessionTable};
use crate::tlv::TlvMessage;
use hearth_crypto::ecdh::{PrivateKey, PublicKey};
use hearth_crypto::random::random_32;
use hearth_crypto::signatures::Signature;
use rand_core::OsRng;
use std::sync::Arc;
use tracing::{debug, info};

/// CASE initiator: opens an operational session to a node on a shared fabric.
#[derive(Debug, Clone)]
pub struct CaseClient {
    sessions: Arc<SessionTable>,
}

impl CaseClient {
    /// Create an initiator allocating sessions from `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SessionTable>) -> Self {
        Self { sessions }
    }

    /// Run CASE towards `peer_node_id` on `fabric` over a freshly initiated
    /// secure channel exchange. The exchange is closed on return.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::CertificateRejected`] or
    /// [`HandshakeError::SignatureInvalid`] when the responder cannot be
    /// authenticated, `Exchange(PeerStatus)` when the responder rejects us,
    /// and decoding, crypto or transport failures otherwise.
    pub async fn establish(
        &self,
        mut exchange: MessageExchange,
        fabric: &dyn Fabric,
        peer_node_id: u64,
    ) -> Result<Arc<Session>, HandshakeError> {
        let mut reserved = None;
        let result = self
            .initiate(&mut exchange, fabric, peer_node_id, &mut reserved)
            .await;
        if let Err(e) = &result {
            abort_handshake(&exchange, e, "CASE").await;
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
        fabric: &dyn Fabric,
        peer_node_id: u64,
        reserved: &mut Option<u16>,
    ) -> Result<Arc<Session>, HandshakeError> {
        let initiator_session_id = self.sessions.allocate_session_id()?;
        *reserved = Some(initiator_session_id);

        let ephemeral = PrivateKey::generate(&mut OsRng);
        let eph_pub_key = ephemeral.public_key().to_bytes();
        let initiator_random = random_32()?;
        let sigma1 = Sigma1 {
            initiator_random,
            initiator_session_id,
            destination_id: fabric.destination_id(&initiator_random, peer_node_id)?,
            initiator_eph_pub_key: eph_pub_key,
            mrp_parameters: Some(self.sessions.parameters()),
        };
        let sigma1_bytes = sigma1.encode()?;
        exchange
            .send(SecureChannelOpcode::Sigma1.as_u8(), &sigma1_bytes)
            .await?;

        let sigma2_message = exchange.next_message().await?;
        expect_opcode(&sigma2_message, SecureChannelOpcode::Sigma2)?;
        let sigma2_bytes = &sigma2_message.payload;
        let sigma2 = Sigma2::decode(sigma2_bytes)?;

        let peer_eph = PublicKey::from_bytes(&sigma2.responder_eph_pub_key)?;
        let shared_secret = ephemeral.exchange(&peer_eph);
        let ipk = fabric.identity_protection_key();
        let s2k = sigma2_key(
            shared_secret.as_bytes(),
            ipk,
            &sigma2.responder_random,
            &sigma2.responder_eph_pub_key,
            &sigma1_bytes,
        )?;
        let tbe2 = TbeData2::decode(&open(&s2k, SIGMA2_NONCE, &sigma2.encrypted2)?)?;

        let peer = fabric.verify_chain(&tbe2.certificate, tbe2.intermediate_certificate.as_deref())?;
        if peer.node_id != peer_node_id {
            return Err(HandshakeError::CertificateRejected("unexpected peer node id"));
        }
        let tbs2 = TbsData {
            certificate: tbe2.certificate,
            intermediate_certificate: tbe2.intermediate_certificate,
            sender_eph_pub_key: sigma2.responder_eph_pub_key,
            receiver_eph_pub_key: eph_pub_key,
        };
        peer.public_key
            .verify(&tbs2.encode()?, &Signature::from_bytes(tbe2.signature))
            .map_err(|_| HandshakeError::SignatureInvalid)?;
        debug!(peer = %exchange.peer(), peer_node_id, "responder authenticated");

        let tbs3 = TbsData {
            certificate: fabric.certificate().to_vec(),
            intermediate_certificate: fabric.intermediate_certificate().map(<[u8]>::to_vec),
            sender_eph_pub_key: eph_pub_key,
            receiver_eph_pub_key: sigma2.responder_eph_pub_key,
        };
        let signature = fabric.sign(&tbs3.encode()?)?;
        let tbe3 = TbeData3 {
            certificate: tbs3.certificate,
            intermediate_certificate: tbs3.intermediate_certificate,
            signature: *signature.as_bytes(),
        };
        let s3k = sigma3_key(shared_secret.as_bytes(), ipk, &sigma1_bytes, sigma2_bytes)?;
        let sigma3_bytes = Sigma3 {
            encrypted3: seal(&s3k, SIGMA3_NONCE, &tbe3.encode()?)?,
        }
        .encode()?;
        exchange
            .send(SecureChannelOpcode::Sigma3.as_u8(), &sigma3_bytes)
            .await?;

        let status_message = exchange.next_message().await?;
        expect_opcode(&status_message, SecureChannelOpcode::StatusReport)?;
        let status = StatusReport::decode(&status_message.payload)
            .map_err(|e| HandshakeError::Exchange(e.into()))?;
        if status.secure_channel_status() != Some(SecureChannelStatus::SessionEstablishmentSuccess) {
            return Err(HandshakeError::UnexpectedStatus(status));
        }

        let salt = session_salt(ipk, &sigma1_bytes, sigma2_bytes, &sigma3_bytes);
        let parameters = sigma2
            .mrp_parameters
            .unwrap_or_else(|| self.sessions.parameters());
        let session = self.sessions.create_secure_session(NewSecureSession {
            local_session_id: initiator_session_id,
            peer_session_id: sigma2.responder_session_id,
            shared_secret: shared_secret.as_bytes(),
            salt: &salt,
            is_initiator: true,
            local_node_id: fabric.node_id(),
            peer_node_id: peer.node_id,
            parameters,
        })?;
        *reserved = None;
        info!(
            peer = %exchange.peer(),
            session = initiator_session_id,
            peer_node_id,
            "CASE session established"
        );
        Ok(session)
    }
}
