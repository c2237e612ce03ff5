//! Secure channel protocol identifiers and the StatusReport message.

use crate::error::CodecError;
use std::fmt;

/// Protocol id of the secure channel protocol (vendor 0, protocol 0)
pub const SECURE_CHANNEL_PROTOCOL_ID: u32 = 0x0000_0000;

/// Secure channel message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SecureChannelOpcode {
    /// Message counter synchronization request
    MsgCounterSyncReq = 0x00,
    /// Message counter synchronization response
    MsgCounterSyncRsp = 0x01,
    /// Acknowledgement with no payload
    StandaloneAck = 0x10,
    /// PASE: PBKDF parameter request
    PbkdfParamRequest = 0x20,
    /// PASE: PBKDF parameter response
    PbkdfParamResponse = 0x21,
    /// PASE: SPAKE2+ share X
    Pake1 = 0x22,
    /// PASE: SPAKE2+ share Y and verifier
    Pake2 = 0x23,
    /// PASE: initiator verifier
    Pake3 = 0x24,
    /// CASE: initiator hello
    Sigma1 = 0x30,
    /// CASE: responder reply
    Sigma2 = 0x31,
    /// CASE: initiator finish
    Sigma3 = 0x32,
    /// CASE: session resumption reply
    Sigma2Resume = 0x33,
    /// Status report
    StatusReport = 0x40,
}

impl SecureChannelOpcode {
    /// Wire value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SecureChannelOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::MsgCounterSyncReq),
            0x01 => Ok(Self::MsgCounterSyncRsp),
            0x10 => Ok(Self::StandaloneAck),
            0x20 => Ok(Self::PbkdfParamRequest),
            0x21 => Ok(Self::PbkdfParamResponse),
            0x22 => Ok(Self::Pake1),
            0x23 => Ok(Self::Pake2),
            0x24 => Ok(Self::Pake3),
            0x30 => Ok(Self::Sigma1),
            0x31 => Ok(Self::Sigma2),
            0x32 => Ok(Self::Sigma3),
            0x33 => Ok(Self::Sigma2Resume),
            0x40 => Ok(Self::StatusReport),
            other => Err(other),
        }
    }
}

/// General status codes shared by all protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum GeneralStatus {
    /// Operation completed
    Success = 0,
    /// Generic failure
    Failure = 1,
    /// Precondition not met
    BadPrecondition = 2,
    /// Value out of range
    OutOfRange = 3,
    /// Malformed request
    BadRequest = 4,
    /// Not supported
    Unsupported = 5,
    /// Unexpected message
    Unexpected = 6,
    /// Resources exhausted
    ResourceExhausted = 7,
    /// Busy, retry later
    Busy = 8,
    /// Timed out
    Timeout = 9,
    /// Continue
    Continue = 10,
    /// Aborted
    Aborted = 11,
    /// Invalid argument
    InvalidArgument = 12,
    /// Not found
    NotFound = 13,
    /// Already exists
    AlreadyExists = 14,
    /// Permission denied
    PermissionDenied = 15,
    /// Data loss
    DataLoss = 16,
}

impl GeneralStatus {
    /// Map a wire value, `None` for unknown codes
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::Success,
            1 => Self::Failure,
            2 => Self::BadPrecondition,
            3 => Self::OutOfRange,
            4 => Self::BadRequest,
            5 => Self::Unsupported,
            6 => Self::Unexpected,
            7 => Self::ResourceExhausted,
            8 => Self::Busy,
            9 => Self::Timeout,
            10 => Self::Continue,
            11 => Self::Aborted,
            12 => Self::InvalidArgument,
            13 => Self::NotFound,
            14 => Self::AlreadyExists,
            15 => Self::PermissionDenied,
            16 => Self::DataLoss,
            _ => return None,
        })
    }
}

/// Secure channel protocol-specific status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SecureChannelStatus {
    /// Handshake finished
    SessionEstablishmentSuccess = 0,
    /// No fabric matched the destination id
    NoSharedTrustRoots = 1,
    /// Handshake parameter rejected
    InvalidParameter = 2,
    /// Peer is closing the session
    CloseSession = 3,
    /// Responder cannot take the handshake now
    Busy = 4,
}

impl SecureChannelStatus {
    /// Map a wire value, `None` for unknown codes
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::SessionEstablishmentSuccess,
            1 => Self::NoSharedTrustRoots,
            2 => Self::InvalidParameter,
            3 => Self::CloseSession,
            4 => Self::Busy,
            _ => return None,
        })
    }
}

/// StatusReport message body.
///
/// ```text
/// general_code (u16) | protocol_id (u32) | protocol_code (u16) | data...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// General status code
    pub general_code: u16,
    /// Protocol the specific code belongs to
    pub protocol_id: u32,
    /// Protocol-specific status code
    pub protocol_code: u16,
    /// Optional protocol-specific data
    pub data: Vec<u8>,
}

impl StatusReport {
    /// Fixed-size part of the encoding
    pub const HEADER_SIZE: usize = 8;

    /// Build a report for the secure channel protocol
    #[must_use]
    pub fn secure_channel(general: GeneralStatus, code: SecureChannelStatus) -> Self {
        Self {
            general_code: general as u16,
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: code as u16,
            data: Vec::new(),
        }
    }

    /// Session establishment succeeded
    #[must_use]
    pub fn secure_channel_success() -> Self {
        Self::secure_channel(
            GeneralStatus::Success,
            SecureChannelStatus::SessionEstablishmentSuccess,
        )
    }

    /// Session establishment failed with the given reason
    #[must_use]
    pub fn secure_channel_failure(code: SecureChannelStatus) -> Self {
        Self::secure_channel(GeneralStatus::Failure, code)
    }

    /// Responder busy
    #[must_use]
    pub fn secure_channel_busy() -> Self {
        Self::secure_channel(GeneralStatus::Busy, SecureChannelStatus::Busy)
    }

    /// Whether the general code is `Success`
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.general_code == GeneralStatus::Success as u16
    }

    /// Secure channel code, if this report belongs to the secure channel protocol
    #[must_use]
    pub fn secure_channel_status(&self) -> Option<SecureChannelStatus> {
        if self.protocol_id == SECURE_CHANNEL_PROTOCOL_ID {
            SecureChannelStatus::from_u16(self.protocol_code)
        } else {
            None
        }
    }

    /// Serialize to wire bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + self.data.len());
        out.extend_from_slice(&self.general_code.to_le_bytes());
        out.extend_from_slice(&self.protocol_id.to_le_bytes());
        out.extend_from_slice(&self.protocol_code.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse from wire bytes
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooShort`] if fewer than 8 bytes are present.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(CodecError::TooShort {
                what: "status report",
                expected: Self::HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            general_code: u16::from_le_bytes([bytes[0], bytes[1]]),
            protocol_id: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            protocol_code: u16::from_le_bytes([bytes[6], bytes[7]]),
            data: bytes[Self::HEADER_SIZE..].to_vec(),
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match GeneralStatus::from_u16(self.general_code) {
            Some(general) => write!(f, "{general:?}")?,
            None => write!(f, "general code {}", self.general_code)?,
        }
        match self.secure_channel_status() {
            Some(code) => write!(f, " ({code:?})"),
            None => write!(
                f,
                " (protocol 0x{:08X} code {})",
                self.protocol_id, self.protocol_code
            ),
        }
    }
}
