//! Secure channel protocol handler and shared handshake helpers.

use crate::case::CaseServer;
use crate::codec::Message;
use crate::error::HandshakeError;
use crate::exchange::{MessageExchange, ProtocolHandler};
use crate::pase::PaseServer;
use crate::protocol::{
    SECURE_CHANNEL_PROTOCOL_ID, SecureChannelOpcode, SecureChannelStatus, StatusReport,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Require `message` to be the secure channel opcode `expected`.
pub(crate) fn expect_opcode(
    message: &Message,
    expected: SecureChannelOpcode,
) -> Result<(), HandshakeError> {
    let header = &message.payload_header;
    if header.protocol_id != SECURE_CHANNEL_PROTOCOL_ID || header.message_type != expected.as_u8() {
        return Err(HandshakeError::UnexpectedMessage {
            expected: expected.as_u8(),
            actual: header.message_type,
        });
    }
    Ok(())
}

/// Log a failed handshake and tell the peer, when the exchange is still usable.
pub(crate) async fn abort_handshake(exchange: &MessageExchange, error: &HandshakeError, handshake: &str) {
    warn!(peer = %exchange.peer(), error = %error, "{handshake} handshake failed");
    if let Some(report) = error.status_report() {
        if let Err(e) = exchange.send_status(&report).await {
            debug!(peer = %exchange.peer(), error = %e, "could not report handshake failure");
        }
    }
}

/// Serves peer-initiated secure channel exchanges, dispatching on the
/// opcode of the first message.
pub struct SecureChannelHandler {
    pase: Option<Arc<PaseServer>>,
    case: Arc<CaseServer>,
}

impl std::fmt::Debug for SecureChannelHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannelHandler")
            .field("commissionable", &self.pase.is_some())
            .finish_non_exhaustive()
    }
}

impl SecureChannelHandler {
    /// Create a handler. Without a PASE responder, PASE requests are
    /// answered with Busy.
    #[must_use]
    pub fn new(pase: Option<Arc<PaseServer>>, case: Arc<CaseServer>) -> Self {
        Self { pase, case }
    }

    async fn reject(exchange: MessageExchange, report: StatusReport) {
        if let Err(e) = exchange.send_status(&report).await {
            debug!(peer = %exchange.peer(), error = %e, "could not send status report");
        }
        exchange.close().await;
    }
}

#[async_trait]
impl ProtocolHandler for SecureChannelHandler {
    fn protocol_id(&self) -> u32 {
        SECURE_CHANNEL_PROTOCOL_ID
    }

    async fn on_new_exchange(&self, mut exchange: MessageExchange) {
        let first = match exchange.next_message().await {
            Ok(message) => message,
            Err(e) => {
                debug!(peer = %exchange.peer(), error = %e, "secure channel exchange ended early");
                exchange.close().await;
                return;
            }
        };

        match SecureChannelOpcode::try_from(first.payload_header.message_type) {
            Ok(SecureChannelOpcode::PbkdfParamRequest) => match &self.pase {
                Some(pase) => {
                    // failures are logged and reported to the peer by the server
                    let _ = pase.handle(exchange, first).await;
                }
                None => {
                    debug!(peer = %exchange.peer(), "PASE request while not commissionable");
                    Self::reject(exchange, StatusReport::secure_channel_busy()).await;
                }
            },
            Ok(SecureChannelOpcode::Sigma1) => {
                let _ = self.case.handle(exchange, first).await;
            }
            opcode => {
                warn!(
                    peer = %exchange.peer(),
                    message_type = first.payload_header.message_type,
                    "unexpected opcode {opcode:?} opening secure channel exchange"
                );
                Self::reject(
                    exchange,
                    StatusReport::secure_channel_failure(SecureChannelStatus::InvalidParameter),
                )
                .await;
            }
        }
    }
}
