use super::fabric::FabricLookup;
use super::messages::{Sigma1, Sigma2, Sigma3, TbeData2, TbeData3, TbsData};
use super::{SIGMA2_NONCE, SIGMA3_NONCE, open, seal, session_salt, sigma2_key, sigma3_key};
use crate::codec::Message;
use crate::error::HandshakeError;
use crate::exchange::MessageExchange;
use crate::protocol::{SecureChannelOpcode, StatusReport};
use crate::secure_channel::{abort_handshake, expect_opcode};
use crate::session::{NewSecureSession, Session, SessionTable};
use crate::tlv::TlvMessage;
use hearth_crypto::ecdh::{PrivateKey, PublicKey};
use hearth_crypto::random::{fill_random, random_32};
use hearth_crypto::signatures::Signature;
use rand_core::OsRng;
use std::sync::Arc;
use tracing::{debug, info};

/// CASE responder answering Sigma1 for any fabric `fabrics` resolves.
pub struct CaseServer {
    sessions: Arc<SessionTable>,
    fabrics: Arc<dyn FabricLookup>,
}

impl std::fmt::Debug for CaseServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseServer").finish_non_exhaustive()
    }
}

impl CaseServer {
    /// Create a responder.
    #[must_use]
    pub fn new(sessions: Arc<SessionTable>, fabrics: Arc<dyn FabricLookup>) -> Self {
        Self { sessions, fabrics }
    }

    /// Run the responder side on an exchange whose first message is
    /// `Sigma1`. The exchange is closed on return.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::NoSharedTrustRoots`] for an unknown
    /// destination, and chain, signature, decoding or transport failures
    /// otherwise. Each is reported to the peer first where applicable.
    pub async fn handle(
        &self,
        mut exchange: MessageExchange,
        sigma1: Message,
    ) -> Result<Arc<Session>, HandshakeError> {
        let mut reserved = None;
        let result = self.respond(&mut exchange, &sigma1, &mut reserved).await;
        if let Err(e) = &result {
            abort_handshake(&exchange, e, "CASE").await;
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
        sigma1_message: &Message,
        reserved: &mut Option<u16>,
    ) -> Result<Arc<Session>, HandshakeError> {
        expect_opcode(sigma1_message, SecureChannelOpcode::Sigma1)?;
        let sigma1_bytes = &sigma1_message.payload;
        let sigma1 = Sigma1::decode(sigma1_bytes)?;

        let fabric = self
            .fabrics
            .find_identity(&sigma1.destination_id, &sigma1.initiator_random)
            .ok_or(HandshakeError::NoSharedTrustRoots)?;
        debug!(
            peer = %exchange.peer(),
            fabric_id = fabric.fabric_id(),
            "Sigma1 matched local fabric"
        );

        let responder_session_id = self.sessions.allocate_session_id()?;
        *reserved = Some(responder_session_id);

        let ephemeral = PrivateKey::generate(&mut OsRng);
        let eph_pub_key = ephemeral.public_key().to_bytes();
        let peer_eph = PublicKey::from_bytes(&sigma1.initiator_eph_pub_key)?;
        let shared_secret = ephemeral.exchange(&peer_eph);
        let responder_random = random_32()?;
        let ipk = fabric.identity_protection_key();

        let tbs2 = TbsData {
            certificate: fabric.certificate().to_vec(),
            intermediate_certificate: fabric.intermediate_certificate().map(<[u8]>::to_vec),
            sender_eph_pub_key: eph_pub_key,
            receiver_eph_pub_key: sigma1.initiator_eph_pub_key,
        };
        let signature = fabric.sign(&tbs2.encode()?)?;
        let mut resumption_id = [0u8; 16];
        fill_random(&mut resumption_id)?;
        let tbe2 = TbeData2 {
            certificate: tbs2.certificate,
            intermediate_certificate: tbs2.intermediate_certificate,
            signature: *signature.as_bytes(),
            resumption_id,
        };
        let s2k = sigma2_key(
            shared_secret.as_bytes(),
            ipk,
            &responder_random,
            &eph_pub_key,
            sigma1_bytes,
        )?;
        let sigma2 = Sigma2 {
            responder_random,
            responder_session_id,
            responder_eph_pub_key: eph_pub_key,
            encrypted2: seal(&s2k, SIGMA2_NONCE, &tbe2.encode()?)?,
            mrp_parameters: Some(self.sessions.parameters()),
        };
        let sigma2_bytes = sigma2.encode()?;
        exchange
            .send(SecureChannelOpcode::Sigma2.as_u8(), &sigma2_bytes)
            .await?;
        debug!(peer = %exchange.peer(), responder_session_id, "sent Sigma2");

        let sigma3_message = exchange.next_message().await?;
        expect_opcode(&sigma3_message, SecureChannelOpcode::Sigma3)?;
        let sigma3_bytes = &sigma3_message.payload;
        let sigma3 = Sigma3::decode(sigma3_bytes)?;
        let s3k = sigma3_key(shared_secret.as_bytes(), ipk, sigma1_bytes, &sigma2_bytes)?;
        let tbe3 = TbeData3::decode(&open(&s3k, SIGMA3_NONCE, &sigma3.encrypted3)?)?;

        let peer = fabric.verify_chain(&tbe3.certificate, tbe3.intermediate_certificate.as_deref())?;
        let tbs3 = TbsData {
            certificate: tbe3.certificate,
            intermediate_certificate: tbe3.intermediate_certificate,
            sender_eph_pub_key: sigma1.initiator_eph_pub_key,
            receiver_eph_pub_key: eph_pub_key,
        };
        peer.public_key
            .verify(&tbs3.encode()?, &Signature::from_bytes(tbe3.signature))
            .map_err(|_| HandshakeError::SignatureInvalid)?;

        let salt = session_salt(ipk, sigma1_bytes, &sigma2_bytes, sigma3_bytes);
        let parameters = sigma1
            .mrp_parameters
            .unwrap_or_else(|| self.sessions.parameters());
        let session = self.sessions.create_secure_session(NewSecureSession {
            local_session_id: responder_session_id,
            peer_session_id: sigma1.initiator_session_id,
            shared_secret: shared_secret.as_bytes(),
            salt: &salt,
            is_initiator: false,
            local_node_id: fabric.node_id(),
            peer_node_id: peer.node_id,
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
            peer_node_id = peer.node_id,
            "CASE session established"
        );
        Ok(session)
    }
}
