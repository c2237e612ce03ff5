//! Error types for the Hearth message layer.

use crate::protocol::{SecureChannelStatus, StatusReport};
use hearth_crypto::CryptoError;
use hearth_transport::TransportError;
use thiserror::Error;

/// Core message layer errors
#[derive(Debug, Error)]
pub enum Error {
    /// TLV encoding or decoding error
    #[error("tlv error: {0}")]
    Tlv(#[from] TlvError),

    /// Packet or payload framing error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Session error
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Exchange (reliable messaging) error
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Session establishment error
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Transport error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// TLV encoding and decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlvError {
    /// Buffer ended inside an element
    #[error("truncated element at offset {offset}: need {needed} more bytes")]
    Truncated {
        /// Offset of the read that failed
        offset: usize,
        /// Bytes missing
        needed: usize,
    },

    /// Element type bits outside the defined range
    #[error("invalid element type: 0x{0:02X}")]
    InvalidElementType(u8),

    /// Tag control not allowed in this position
    #[error("invalid tag control {0} for element")]
    InvalidTagControl(u8),

    /// End-of-container outside of a container
    #[error("unexpected end of container at offset {0}")]
    UnexpectedEndOfContainer(usize),

    /// Bytes left after the top-level element
    #[error("{0} trailing bytes after element")]
    TrailingBytes(usize),

    /// Containers nested deeper than the decoder allows
    #[error("containers nested deeper than {0}")]
    NestingTooDeep(usize),

    /// UTF-8 string element with invalid contents
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Schema decoding expected a structure
    #[error("expected structure for {0}")]
    NotAStructure(&'static str),

    /// Structure member carried a tag that is not a context tag
    #[error("unexpected tag {tag} in {schema}")]
    UnexpectedTag {
        /// Schema being decoded
        schema: &'static str,
        /// Offending tag, rendered
        tag: String,
    },

    /// Required field absent
    #[error("missing field {schema}.{field}")]
    MissingField {
        /// Schema being encoded or decoded
        schema: &'static str,
        /// Field name
        field: &'static str,
    },

    /// Field value does not match its declared type
    #[error("field {schema}.{field} has the wrong type")]
    FieldTypeMismatch {
        /// Schema being encoded or decoded
        schema: &'static str,
        /// Field name
        field: &'static str,
    },

    /// Record carries a field the schema does not declare
    #[error("unknown field {field} for {schema}")]
    UnknownField {
        /// Schema being encoded
        schema: &'static str,
        /// Field name
        field: String,
    },

    /// Field present but its value is out of range for its target type
    #[error("field {0} out of range")]
    OutOfRange(&'static str),
}

/// Packet and payload header framing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer too short to parse
    #[error("{what} too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Structure being parsed
        what: &'static str,
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Message format version other than 0
    #[error("unsupported message version: {0}")]
    UnsupportedVersion(u8),

    /// Reserved message flag bits set
    #[error("reserved message flag bits set: 0x{0:02X}")]
    ReservedFlags(u8),

    /// Both destination node and group flags set
    #[error("invalid destination flags: 0x{0:02X}")]
    InvalidDestination(u8),

    /// Session type other than unicast or group
    #[error("unsupported session type: {0}")]
    UnsupportedSessionType(u8),

    /// Privacy or message extension security flags set
    #[error("unsupported security flags: 0x{0:02X}")]
    UnsupportedSecurityFlags(u8),

    /// Secured extensions in the payload header
    #[error("secured extensions are not supported")]
    SecuredExtensions,

    /// Vendor flag set with vendor id 0, which has no canonical encoding
    #[error("vendor flag set with vendor id 0")]
    ZeroVendorId,
}

/// Session-level errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this local id
    #[error("unknown session: {0}")]
    UnknownSession(u16),

    /// Every non-zero session id is in use
    #[error("no free session ids")]
    SessionIdsExhausted,

    /// Message decryption failed (authentication failure)
    #[error("message authentication failed for session {0}")]
    AuthenticationFailed(u16),

    /// Packet shorter than an authentication tag
    #[error("secured payload too short: {0} bytes")]
    PayloadTooShort(usize),

    /// Application traffic requires a secure session
    #[error("session {0} is not secure")]
    NotSecure(u16),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Framing error while encoding or decoding
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Exchange (reliable messaging) errors
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Exchange closed; no further messages will arrive
    #[error("exchange closed")]
    Closed,

    /// Exchange closed after the peer never acknowledged a message
    #[error("message {0} not acknowledged after all retransmissions")]
    RetransmissionLimit(u32),

    /// A sent message is still waiting for its acknowledgement
    #[error("previous message {0} not yet acknowledged")]
    AckPending(u32),

    /// Peer sent a new message without acknowledging ours
    #[error("previous message ack is missing (awaiting ack for {0})")]
    AckMissing(u32),

    /// Peer acknowledged a different message than the outstanding one
    #[error("incorrect ack received: expected {expected}, got {actual}")]
    AckMismatch {
        /// Outstanding message id
        expected: u32,
        /// Acknowledged message id
        actual: u32,
    },

    /// Peer reported a failure through a status report
    #[error("peer reported {0}")]
    PeerStatus(StatusReport),

    /// Status report payload could not be parsed
    #[error("malformed status report: {0}")]
    MalformedStatus(#[from] CodecError),

    /// Sending failed at the session layer
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Sending failed at the transport
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// PASE and CASE session establishment errors
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Message type other than the one the handshake step expects
    #[error("unexpected message type 0x{actual:02X} (expected 0x{expected:02X})")]
    UnexpectedMessage {
        /// Expected opcode
        expected: u8,
        /// Received opcode
        actual: u8,
    },

    /// Passcode id other than the default
    #[error("unsupported passcode id {0}")]
    InvalidPasscodeId(u16),

    /// Handshake parameter rejected
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Peer echoed a different initiator random
    #[error("initiator random mismatch")]
    RandomMismatch,

    /// Key confirmation value did not match
    #[error("key confirmation verifier mismatch")]
    VerifierMismatch,

    /// No local fabric matches the destination id
    #[error("no fabric matches the destination identifier")]
    NoSharedTrustRoots,

    /// Peer certificate chain failed verification
    #[error("certificate rejected: {0}")]
    CertificateRejected(&'static str),

    /// Peer signature over the handshake data failed verification
    #[error("handshake signature invalid")]
    SignatureInvalid,

    /// Status report other than success at the end of a handshake
    #[error("unexpected status report: {0}")]
    UnexpectedStatus(StatusReport),

    /// TLV decoding failed
    #[error("tlv error: {0}")]
    Tlv(#[from] TlvError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Session table error
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Exchange error (includes peer status reports)
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

impl HandshakeError {
    /// Status report to send to the peer before abandoning the handshake.
    ///
    /// Returns `None` for failures the peer reported or that left the
    /// exchange unusable.
    #[must_use]
    pub fn status_report(&self) -> Option<StatusReport> {
        match self {
            Self::Exchange(_) => None,
            Self::NoSharedTrustRoots => Some(StatusReport::secure_channel_failure(
                SecureChannelStatus::NoSharedTrustRoots,
            )),
            Self::Session(SessionError::SessionIdsExhausted) => Some(
                StatusReport::secure_channel_busy(),
            ),
            _ => Some(StatusReport::secure_channel_failure(
                SecureChannelStatus::InvalidParameter,
            )),
        }
    }

    /// Peer-reported status, if this error carries one.
    #[must_use]
    pub fn peer_status(&self) -> Option<&StatusReport> {
        match self {
            Self::Exchange(ExchangeError::PeerStatus(report)) => Some(report),
            _ => None,
        }
    }
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
