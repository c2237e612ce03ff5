//! Reliable message exchanges (MRP).
//!
//! An exchange is one request/response conversation inside a session. Each
//! side keeps at most one sent message waiting for its acknowledgement and
//! at most one received message it still owes an acknowledgement for.
//! Acknowledgements piggyback on the next outgoing message of the exchange;
//! a StandaloneAck is sent only when the exchange closes with one owed, or
//! when the peer retransmits into an exchange that is already gone.
//!
//! Closing an exchange whose last message is still unacknowledged keeps it
//! registered until that ack arrives or retries run out, so a lost final
//! reply is recovered from the peer's retransmission.
//!
//! ```text
//!            send()                      matching ack
//!   Idle ───────────────► AwaitingAck ──────────────► Idle
//!                           │    ▲
//!               timer fires │    │ resend same bytes
//!                           └────┘  (up to N retries, then Closed)
//! ```

mod manager;
mod message_exchange;

pub use manager::{ExchangeManager, ProtocolHandler};
pub use message_exchange::MessageExchange;

use dashmap::DashMap;
use message_exchange::ExchangeCore;
use std::net::SocketAddr;
use std::sync::Arc;

/// Identifies an exchange from the local point of view.
///
/// The peer address is part of the key because the unsecured session is
/// shared by every peer that is mid-handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    /// Local session id
    pub session_id: u16,
    /// Exchange id chosen by the initiator
    pub exchange_id: u16,
    /// Whether this side initiated the exchange
    pub locally_initiated: bool,
    /// Peer address
    pub peer: SocketAddr,
}

pub(crate) type ExchangeTable = DashMap<ExchangeKey, Arc<ExchangeCore>>;
