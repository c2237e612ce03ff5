//! Inbound dispatch and exchange bookkeeping.
//!
//! ```text
//! Transport ─► decode_packet ─► SessionTable ─► Session::decode ─► exchange lookup
//!                                                                    │
//!                               existing exchange ◄──────────────────┤
//!                               new exchange ─► ProtocolHandler task ┘
//! ```

use super::message_exchange::{MessageExchange, send_standalone_ack};
use super::{ExchangeKey, ExchangeTable};
use crate::codec::decode_packet;
use crate::error::Result;
use crate::protocol::{SECURE_CHANNEL_PROTOCOL_ID, SecureChannelOpcode};
use crate::session::{Session, SessionTable};
use async_trait::async_trait;
use dashmap::DashMap;
use hearth_transport::{MAX_DATAGRAM_SIZE, Transport, TransportError};
use rand_core::{OsRng, RngCore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Handles exchanges the peer opens for one protocol.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Protocol id this handler serves
    fn protocol_id(&self) -> u32;

    /// Drive a peer-initiated exchange. Its first message is already queued.
    async fn on_new_exchange(&self, exchange: MessageExchange);
}

/// Routes datagrams to exchanges and spawns handlers for new ones.
pub struct ExchangeManager {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionTable>,
    exchanges: Arc<ExchangeTable>,
    handlers: DashMap<u32, Arc<dyn ProtocolHandler>>,
    next_exchange_id: AtomicU16,
}

impl std::fmt::Debug for ExchangeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeManager")
            .field("exchanges", &self.exchanges.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl ExchangeManager {
    /// Create a manager over a transport and session table.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, sessions: Arc<SessionTable>) -> Self {
        Self {
            transport,
            sessions,
            exchanges: Arc::new(ExchangeTable::new()),
            handlers: DashMap::new(),
            next_exchange_id: AtomicU16::new((OsRng.next_u32() & 0xFFFF) as u16),
        }
    }

    /// Register the handler for a protocol, replacing any previous one.
    pub fn add_protocol_handler(&self, handler: Arc<dyn ProtocolHandler>) {
        self.handlers.insert(handler.protocol_id(), handler);
    }

    /// Session table shared with handshakes
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Underlying transport
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Number of open exchanges
    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Open an exchange as initiator.
    pub fn initiate(
        &self,
        session: Arc<Session>,
        peer: SocketAddr,
        protocol_id: u32,
    ) -> MessageExchange {
        let exchange_id = self.next_exchange_id.fetch_add(1, Ordering::Relaxed);
        let key = ExchangeKey {
            session_id: session.id(),
            exchange_id,
            locally_initiated: true,
            peer,
        };
        let (exchange, core) = MessageExchange::new(
            key,
            protocol_id,
            session,
            Arc::clone(&self.transport),
            &self.exchanges,
        );
        self.exchanges.insert(key, core);
        exchange
    }

    /// Process one inbound datagram.
    ///
    /// # Errors
    ///
    /// Returns framing, session and reliability errors; the datagram is
    /// dropped in every error case.
    pub async fn on_datagram(&self, data: &[u8], peer: SocketAddr) -> Result<()> {
        let packet = decode_packet(data)?;
        let session = self.sessions.get(packet.header.session_id)?;
        let message = session.decode(&packet)?;
        let header = message.payload_header;

        let key = ExchangeKey {
            session_id: session.id(),
            exchange_id: header.exchange_id,
            locally_initiated: !header.is_initiator,
            peer,
        };
        let existing = self.exchanges.get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(core) = existing {
            core.on_message_received(message).await?;
            return Ok(());
        }

        if !header.is_initiator {
            debug!(?key, "message for unknown exchange dropped");
            // a retransmitted final message: stop the peer resending it
            if header.requires_ack {
                send_standalone_ack(&session, self.transport.as_ref(), key, message.packet_header.message_id)
                    .await?;
            }
            return Ok(());
        }
        if header.protocol_id == SECURE_CHANNEL_PROTOCOL_ID
            && header.message_type == SecureChannelOpcode::StandaloneAck.as_u8()
        {
            debug!(?key, "standalone ack for closed exchange ignored");
            return Ok(());
        }
        let Some(handler) = self
            .handlers
            .get(&header.protocol_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            debug!(?key, protocol = header.protocol_id, "no handler for protocol");
            return Ok(());
        };

        let (exchange, core) = MessageExchange::new(
            key,
            header.protocol_id,
            session,
            Arc::clone(&self.transport),
            &self.exchanges,
        );
        self.exchanges.insert(key, Arc::clone(&core));
        core.on_message_received(message).await?;
        tokio::spawn(async move {
            handler.on_new_exchange(exchange).await;
        });
        Ok(())
    }

    /// Receive loop. Datagrams are processed one at a time, in arrival
    /// order, until the transport closes.
    pub async fn run(&self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            if self.transport.is_closed() {
                break;
            }

            match tokio::time::timeout(Duration::from_millis(100), self.transport.recv_from(&mut buf))
                .await
            {
                Ok(Ok((size, from))) => {
                    if let Err(e) = self.on_datagram(&buf[..size], from).await {
                        debug!("dropped datagram from {}: {}", from, e);
                    }
                }
                Ok(Err(TransportError::Closed)) => break,
                Ok(Err(e)) => {
                    warn!("error receiving datagram: {}", e);
                }
                Err(_) => {
                    // timeout, check for shutdown
                    continue;
                }
            }
        }
        debug!("receive loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Message, PacketHeader, PayloadHeader, decode_payload, encode_packet};
    use hearth_transport::MemoryTransport;
    use tokio::sync::mpsc;

    const ECHO: u32 = 0xFFF1_0002;

    /// Echoes the first message's payload back, then closes.
    struct Echo {
        seen: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl ProtocolHandler for Echo {
        fn protocol_id(&self) -> u32 {
            ECHO
        }

        async fn on_new_exchange(&self, mut exchange: MessageExchange) {
            let Ok(message) = exchange.next_message().await else {
                return;
            };
            let _ = self.seen.send(message.payload.clone());
            if exchange.send(0x02, &message.payload).await.is_ok() {
                let _ = exchange.next_message().await;
            }
            exchange.close().await;
        }
    }

    fn managers() -> (Arc<ExchangeManager>, Arc<ExchangeManager>) {
        let (a, b) = MemoryTransport::pair(
            "127.0.0.1:5540".parse().unwrap(),
            "127.0.0.1:5541".parse().unwrap(),
        );
        (
            Arc::new(ExchangeManager::new(a, Arc::new(SessionTable::default()))),
            Arc::new(ExchangeManager::new(b, Arc::new(SessionTable::default()))),
        )
    }

    #[tokio::test]
    async fn test_request_response_through_handler() {
        let (client, server) = managers();
        let (tx, mut seen) = mpsc::unbounded_channel();
        server.add_protocol_handler(Arc::new(Echo { seen: tx }));

        let server_loop = Arc::clone(&server);
        tokio::spawn(async move { server_loop.run().await });
        let client_loop = Arc::clone(&client);
        tokio::spawn(async move { client_loop.run().await });

        let peer = server.transport().local_addr().unwrap();
        let mut exchange = client.initiate(client.sessions().unsecure_session().unwrap(), peer, ECHO);
        exchange.send(0x01, b"hello").await.unwrap();

        let response = exchange.next_message().await.unwrap();
        assert_eq!(response.payload, b"hello");
        assert_eq!(response.payload_header.message_type, 0x02);
        assert_eq!(seen.recv().await.unwrap(), b"hello");

        exchange.close().await;
        assert_eq!(client.exchange_count(), 0);

        // the server side closes once our standalone ack lands
        for _ in 0..50 {
            if server.exchange_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.exchange_count(), 0);
    }

    #[tokio::test]
    async fn test_drops_unsolicited_and_unknown() {
        let (client, server) = managers();
        let from = client.transport().local_addr().unwrap();

        let message = |is_initiator, protocol_id| Message {
            packet_header: PacketHeader {
                message_id: 1,
                ..PacketHeader::default()
            },
            payload_header: PayloadHeader {
                exchange_id: 3,
                protocol_id,
                message_type: 0x01,
                is_initiator,
                requires_ack: true,
                acked_message_id: None,
            },
            payload: Vec::new(),
        };
        let session = server.sessions().unsecure_session().unwrap();

        // reply to an exchange we never opened is acknowledged, not delivered
        let bytes = encode_packet(&session.encode(message(false, ECHO)).unwrap());
        server.on_datagram(&bytes, from).await.unwrap();
        let mut buf = [0u8; 256];
        let (size, _) = client.transport().recv_from(&mut buf).await.unwrap();
        let ack = decode_payload(&decode_packet(&buf[..size]).unwrap()).unwrap();
        assert_eq!(ack.payload_header.message_type, SecureChannelOpcode::StandaloneAck.as_u8());
        assert_eq!(ack.payload_header.acked_message_id, Some(1));
        assert_eq!(ack.payload_header.exchange_id, 3);
        assert!(ack.payload_header.is_initiator);
        // protocol without a handler
        let bytes = encode_packet(&session.encode(message(true, ECHO)).unwrap());
        server.on_datagram(&bytes, from).await.unwrap();
        assert_eq!(server.exchange_count(), 0);

        // unknown session id
        let mut bytes = bytes;
        bytes[1] = 0x99;
        assert!(server.on_datagram(&bytes, from).await.is_err());
        // garbage
        assert!(server.on_datagram(&[0xFF; 4], from).await.is_err());
    }

    #[tokio::test]
    async fn test_exchange_ids_increment() {
        let (client, _server) = managers();
        let peer = "127.0.0.1:5541".parse().unwrap();
        let session = client.sessions().unsecure_session().unwrap();
        let first = client.initiate(Arc::clone(&session), peer, ECHO);
        let second = client.initiate(session, peer, ECHO);
        assert_eq!(second.exchange_id(), first.exchange_id().wrapping_add(1));
        assert!(first.is_initiator());
        assert_eq!(client.exchange_count(), 2);
    }
}
