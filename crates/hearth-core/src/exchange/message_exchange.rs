use super::{ExchangeKey, ExchangeTable};
use crate::codec::{Message, PacketHeader, PayloadHeader, encode_packet};
use crate::error::ExchangeError;
use crate::protocol::{SECURE_CHANNEL_PROTOCOL_ID, SecureChannelOpcode, StatusReport};
use crate::session::Session;
use hearth_transport::Transport;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Last sent message, kept for retransmission until acknowledged.
#[derive(Debug)]
struct SentMessage {
    message_id: u32,
    acked_message_id: Option<u32>,
    bytes: Arc<Vec<u8>>,
}

#[derive(Debug, Default)]
struct ExchangeState {
    sent_message_to_ack: Option<SentMessage>,
    received_message_to_ack: Option<u32>,
    retransmission: Option<JoinHandle<()>>,
    queue: Option<mpsc::UnboundedSender<Message>>,
    exhausted: Option<u32>,
    /// Closed by the consumer while the last sent message is unacknowledged
    closing: bool,
}

/// Shared half of an exchange: the manager routes inbound messages to it
/// and its retransmission task resends through it.
pub(crate) struct ExchangeCore {
    key: ExchangeKey,
    protocol_id: u32,
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    table: Weak<ExchangeTable>,
    state: Mutex<ExchangeState>,
}

impl std::fmt::Debug for ExchangeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCore")
            .field("key", &self.key)
            .field("protocol_id", &self.protocol_id)
            .finish_non_exhaustive()
    }
}

impl ExchangeCore {
    /// Apply the reliability rules to an inbound message and queue it.
    pub(crate) async fn on_message_received(
        self: &Arc<Self>,
        message: Message,
    ) -> Result<(), ExchangeError> {
        let message_id = message.packet_header.message_id;
        let header = message.payload_header;
        let mut state = self.state.lock().await;

        if state.received_message_to_ack == Some(message_id) {
            debug!(exchange = ?self.key, message_id, "duplicate message ignored");
            return Ok(());
        }

        let Some(sent) = &state.sent_message_to_ack else {
            if header.acked_message_id.is_some() {
                debug!(exchange = ?self.key, message_id, "ack with nothing outstanding, message dropped");
                return Ok(());
            }
            return self.deliver(state, message).await;
        };

        if sent.acked_message_id == Some(message_id) {
            // peer missed our reply, which carried the ack
            debug!(exchange = ?self.key, message_id = sent.message_id, "peer retransmitted, resending reply");
            let bytes = Arc::clone(&sent.bytes);
            drop(state);
            self.transport.send_to(&bytes, self.key.peer).await?;
            return Ok(());
        }

        let expected = sent.message_id;
        match header.acked_message_id {
            None => return Err(ExchangeError::AckMissing(expected)),
            Some(actual) if actual != expected => {
                return Err(ExchangeError::AckMismatch { expected, actual });
            }
            Some(_) => {
                trace!(exchange = ?self.key, message_id = expected, "acknowledged");
                state.sent_message_to_ack = None;
                if let Some(timer) = state.retransmission.take() {
                    timer.abort();
                }
            }
        }

        if state.closing {
            // last reply delivered; ack anything new the peer sent with it
            let ack_owed = header.requires_ack.then_some(message_id);
            drop(state);
            self.shutdown(ack_owed).await;
            return Ok(());
        }
        self.deliver(state, message).await
    }

    /// Queue a message that passed the ack checks.
    async fn deliver(
        self: &Arc<Self>,
        mut state: MutexGuard<'_, ExchangeState>,
        message: Message,
    ) -> Result<(), ExchangeError> {
        let message_id = message.packet_header.message_id;
        let header = message.payload_header;
        if header.protocol_id == SECURE_CHANNEL_PROTOCOL_ID
            && header.message_type == SecureChannelOpcode::StandaloneAck.as_u8()
        {
            drop(state);
            self.shutdown(None).await;
            return Ok(());
        }

        if header.requires_ack {
            state.received_message_to_ack = Some(message_id);
        }
        match &state.queue {
            Some(queue) => {
                if queue.send(message).is_err() {
                    debug!(exchange = ?self.key, "consumer gone, message dropped");
                }
            }
            None => debug!(exchange = ?self.key, "exchange closed, message dropped"),
        }
        Ok(())
    }

    fn spawn_retransmission(self: &Arc<Self>, message_id: u32, bytes: Arc<Vec<u8>>) -> JoinHandle<()> {
        let core = Arc::clone(self);
        let parameters = self.session.parameters();
        tokio::spawn(async move {
            let interval = parameters.active_retransmission_interval;
            for attempt in 1..=parameters.retransmission_retries {
                tokio::time::sleep(interval).await;
                debug!(exchange = ?core.key, message_id, attempt, "retransmitting");
                if let Err(e) = core.transport.send_to(&bytes, core.key.peer).await {
                    warn!(exchange = ?core.key, "retransmission failed: {}", e);
                }
            }
            tokio::time::sleep(interval).await;
            core.on_retransmissions_exhausted(message_id).await;
        })
    }

    async fn on_retransmissions_exhausted(&self, message_id: u32) {
        {
            let mut state = self.state.lock().await;
            match &state.sent_message_to_ack {
                Some(sent) if sent.message_id == message_id => {}
                _ => return,
            }
            // detach instead of aborting: this runs on the timer task itself
            state.retransmission = None;
            state.exhausted = Some(message_id);
        }
        warn!(exchange = ?self.key, message_id, "message not acknowledged, closing exchange");
        self.shutdown(None).await;
    }

    /// Close the queue, cancel the timer and unregister. If `ack_owed`
    /// carries a message id, a StandaloneAck for it is sent first.
    async fn shutdown(&self, ack_owed: Option<u32>) {
        {
            let mut state = self.state.lock().await;
            state.queue = None;
            state.sent_message_to_ack = None;
            state.received_message_to_ack = None;
            if let Some(timer) = state.retransmission.take() {
                timer.abort();
            }
        }

        if let Some(acked) = ack_owed {
            if let Err(e) = self.send_standalone_ack(acked).await {
                debug!(exchange = ?self.key, "standalone ack failed: {}", e);
            }
        }

        if let Some(table) = self.table.upgrade() {
            table.remove(&self.key);
        }
        trace!(exchange = ?self.key, "exchange closed");
    }

    async fn send_standalone_ack(&self, acked: u32) -> Result<(), ExchangeError> {
        send_standalone_ack(&self.session, self.transport.as_ref(), self.key, acked).await
    }
}

/// Acknowledge `acked` outside of any outgoing message.
pub(crate) async fn send_standalone_ack(
    session: &Session,
    transport: &dyn Transport,
    key: ExchangeKey,
    acked: u32,
) -> Result<(), ExchangeError> {
    let message = Message {
        packet_header: PacketHeader {
            message_id: session.next_message_id(),
            ..PacketHeader::default()
        },
        payload_header: PayloadHeader {
            exchange_id: key.exchange_id,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            message_type: SecureChannelOpcode::StandaloneAck.as_u8(),
            is_initiator: key.locally_initiated,
            requires_ack: false,
            acked_message_id: Some(acked),
        },
        payload: Vec::new(),
    };
    let bytes = encode_packet(&session.encode(message)?);
    transport.send_to(&bytes, key.peer).await?;
    Ok(())
}

/// Consumer half of an exchange, owned by exactly one handshake or
/// application task.
#[derive(Debug)]
pub struct MessageExchange {
    core: Arc<ExchangeCore>,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl MessageExchange {
    pub(crate) fn new(
        key: ExchangeKey,
        protocol_id: u32,
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        table: &Arc<ExchangeTable>,
    ) -> (Self, Arc<ExchangeCore>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = Arc::new(ExchangeCore {
            key,
            protocol_id,
            session,
            transport,
            table: Arc::downgrade(table),
            state: Mutex::new(ExchangeState {
                queue: Some(tx),
                ..ExchangeState::default()
            }),
        });
        (
            Self {
                core: Arc::clone(&core),
                inbox: rx,
            },
            core,
        )
    }

    /// Exchange id
    #[must_use]
    pub fn exchange_id(&self) -> u16 {
        self.core.key.exchange_id
    }

    /// Whether this side initiated the exchange
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.core.key.locally_initiated
    }

    /// Peer address
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.core.key.peer
    }

    /// Protocol this exchange carries
    #[must_use]
    pub fn protocol_id(&self) -> u32 {
        self.core.protocol_id
    }

    /// Session the exchange runs in
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.core.session
    }

    /// Send a message that requires an acknowledgement.
    ///
    /// Piggybacks the ack owed for the last received message and arms the
    /// retransmission timer.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::AckPending`] while a previous message is
    /// unacknowledged, [`ExchangeError::Closed`] after close, and session or
    /// transport errors from encoding and sending.
    pub async fn send(&self, message_type: u8, payload: &[u8]) -> Result<(), ExchangeError> {
        let core = &self.core;
        let mut state = core.state.lock().await;
        if state.queue.is_none() {
            return Err(ExchangeError::Closed);
        }
        if let Some(sent) = &state.sent_message_to_ack {
            return Err(ExchangeError::AckPending(sent.message_id));
        }

        let message_id = core.session.next_message_id();
        let acked_message_id = state.received_message_to_ack;
        let message = Message {
            packet_header: PacketHeader {
                message_id,
                ..PacketHeader::default()
            },
            payload_header: PayloadHeader {
                exchange_id: core.key.exchange_id,
                protocol_id: core.protocol_id,
                message_type,
                is_initiator: core.key.locally_initiated,
                requires_ack: true,
                acked_message_id,
            },
            payload: payload.to_vec(),
        };
        let bytes = Arc::new(encode_packet(&core.session.encode(message)?));
        core.transport.send_to(&bytes, core.key.peer).await?;
        trace!(exchange = ?core.key, message_id, message_type, "sent");

        state.received_message_to_ack = None;
        state.retransmission = Some(core.spawn_retransmission(message_id, Arc::clone(&bytes)));
        state.sent_message_to_ack = Some(SentMessage {
            message_id,
            acked_message_id,
            bytes,
        });
        Ok(())
    }

    /// Send a StatusReport on the secure channel protocol.
    ///
    /// # Errors
    ///
    /// See [`MessageExchange::send`].
    pub async fn send_status(&self, report: &StatusReport) -> Result<(), ExchangeError> {
        self.send(SecureChannelOpcode::StatusReport.as_u8(), &report.encode())
            .await
    }

    /// Wait for the next message.
    ///
    /// A secure channel StatusReport with a non-success general code is
    /// returned as [`ExchangeError::PeerStatus`].
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Closed`] once the exchange is closed and
    /// drained, or [`ExchangeError::RetransmissionLimit`] if it closed because
    /// the peer never acknowledged a message.
    pub async fn next_message(&mut self) -> Result<Message, ExchangeError> {
        let Some(message) = self.inbox.recv().await else {
            let state = self.core.state.lock().await;
            return Err(match state.exhausted {
                Some(message_id) => ExchangeError::RetransmissionLimit(message_id),
                None => ExchangeError::Closed,
            });
        };

        let header = &message.payload_header;
        if header.protocol_id == SECURE_CHANNEL_PROTOCOL_ID
            && header.message_type == SecureChannelOpcode::StatusReport.as_u8()
        {
            let report = StatusReport::decode(&message.payload)?;
            if !report.is_success() {
                return Err(ExchangeError::PeerStatus(report));
            }
        }
        Ok(message)
    }

    /// Close the exchange.
    ///
    /// Stops delivery to this consumer. If the last sent message is still
    /// unacknowledged the exchange stays registered and keeps retransmitting
    /// it, and answers a retransmission of the peer's previous message by
    /// resending it, until the ack arrives or retries run out. Otherwise it
    /// unregisters at once, sending a StandaloneAck if one is owed.
    pub async fn close(self) {
        let mut state = self.core.state.lock().await;
        state.queue = None;
        if state.sent_message_to_ack.is_some() {
            state.closing = true;
            trace!(exchange = ?self.core.key, "closed, awaiting final ack");
            return;
        }
        let ack_owed = state.received_message_to_ack;
        drop(state);
        self.core.shutdown(ack_owed).await;
    }
}
