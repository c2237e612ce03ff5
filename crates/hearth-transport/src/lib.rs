//! # Hearth Transport
//!
//! Datagram transport layer for the Hearth message layer.
//!
//! The message layer only needs an unreliable, unordered datagram channel:
//! reliability comes from per-exchange acknowledgement and retransmission
//! above this crate. This crate provides:
//! - The [`Transport`](transport::Transport) trait the message layer is written against
//! - [`AsyncUdpTransport`](udp_async::AsyncUdpTransport), a Tokio UDP socket tuned with socket2
//! - [`MemoryTransport`](memory::MemoryTransport), connected in-process endpoints with
//!   loss injection for tests and simulations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod transport;
pub mod udp_async;

pub use memory::MemoryTransport;
pub use transport::{Transport, TransportError, TransportResult, TransportStats};
pub use udp_async::AsyncUdpTransport;

/// Largest datagram the message layer sends or expects (IPv6 minimum MTU
/// minus IP and UDP headers).
pub const MAX_DATAGRAM_SIZE: usize = 1280;

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Socket receive buffer size
    pub recv_buffer_size: usize,
    /// Socket send buffer size
    pub send_buffer_size: usize,
    /// Restrict IPv6 sockets to IPv6 traffic only
    pub ipv6_only: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 256 * 1024,
            send_buffer_size: 256 * 1024,
            ipv6_only: false,
        }
    }
}
