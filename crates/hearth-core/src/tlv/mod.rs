//! Tag-Length-Value encoding for structured message payloads.
//!
//! Every element starts with a control byte:
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +-----------+-------------------+
//! |tag control|   element type    |
//! +-----------+-------------------+
//! ```
//!
//! followed by the tag bytes selected by the tag control, then the
//! length (for strings) and value bytes. All multi-byte fields are
//! little-endian. Integers and lengths use the smallest width that holds
//! the value.
//!
//! [`element`] is the untyped layer (any TLV tree round-trips through
//! [`Element`]). [`schema`] layers declarative structure descriptions on
//! top, which the handshake messages use.

pub mod element;
pub mod schema;

pub use element::{Element, Tag, Value, decode, encode};
pub use schema::{FieldType, FieldValue, Record, StructSchema, TlvMessage};

/// Maximum container nesting accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 32;
