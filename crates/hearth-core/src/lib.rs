//! # Hearth Core
//!
//! Message and security layer for Matter-style IoT devices.
//!
//! This crate provides:
//! - A schema-driven TLV codec
//! - Packet and payload header framing
//! - Reliable exchanges (acknowledgement and retransmission) over datagrams
//! - AES-CCM secure sessions and the session table
//! - PASE (SPAKE2+) and CASE (SIGMA) session establishment
//! - A [`Node`](node::Node) composing all of the above over a transport
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  PASE / CASE / applications                      │
//! │      (protocol handlers driving one exchange each)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Exchanges                                │
//! │   (request/response conversations, one unacked message each)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Sessions                                 │
//! │   (unsecured session 0, AEAD-protected secure sessions)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      Packet framing                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod case;
pub mod codec;
pub mod error;
pub mod exchange;
pub mod node;
pub mod pase;
pub mod protocol;
pub mod secure_channel;
pub mod session;
pub mod tlv;

pub use codec::{Message, Packet, PacketHeader, PayloadHeader};
pub use error::{Error, Result};
pub use exchange::{ExchangeManager, MessageExchange, ProtocolHandler};
pub use node::{Node, NodeConfig};
pub use protocol::{SECURE_CHANNEL_PROTOCOL_ID, SecureChannelOpcode, StatusReport};
pub use secure_channel::SecureChannelHandler;
pub use session::{Session, SessionParameters, SessionTable};
