//! Packet and payload header framing.
//!
//! ```text
//! Packet header (8-26 bytes, little-endian):
//! +-------+------------+---------+------------+--------------+--------------+
//! | flags | session id | sec flg | message id | [source node]| [dest node / |
//! |  (1)  |    (2)     |   (1)   |    (4)     |     (8)      |  group (8/2)]|
//! +-------+------------+---------+------------+--------------+--------------+
//!
//! Payload header (6-12 bytes, inside the encrypted region):
//! +----------+--------+-------------+----------+----------+-------------+
//! | exch flg | opcode | exchange id | [vendor] | protocol | [acked msg] |
//! |   (1)    |  (1)   |     (2)     |   (2)    |   (2)    |     (4)     |
//! +----------+--------+-------------+----------+----------+-------------+
//! ```

use crate::error::CodecError;

/// Minimum packet header size
pub const PACKET_HEADER_MIN_SIZE: usize = 8;

/// Minimum payload header size
pub const PAYLOAD_HEADER_MIN_SIZE: usize = 6;

/// Message flags byte of the packet header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// Destination node id present
    pub const DEST_NODE: u8 = 0b0000_0001;
    /// Destination group id present
    pub const DEST_GROUP: u8 = 0b0000_0010;
    /// Both DSIZ bits
    pub const DSIZ_MASK: u8 = 0b0000_0011;
    /// Source node id present
    pub const SOURCE_NODE: u8 = 0b0000_0100;
    /// Reserved bit
    pub const RESERVED: u8 = 0b0000_1000;
    /// Version nibble
    pub const VERSION_MASK: u8 = 0b1111_0000;

    /// Empty flags, version 0
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    /// Wrap a raw byte
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw byte
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Mark the source node id as present
    #[must_use]
    pub fn with_source_node(mut self) -> Self {
        self.0 |= Self::SOURCE_NODE;
        self
    }

    /// Mark a destination node id as present
    #[must_use]
    pub fn with_dest_node(mut self) -> Self {
        self.0 |= Self::DEST_NODE;
        self
    }

    /// Mark a destination group id as present
    #[must_use]
    pub fn with_dest_group(mut self) -> Self {
        self.0 |= Self::DEST_GROUP;
        self
    }

    /// Format version
    #[must_use]
    pub fn version(self) -> u8 {
        self.0 >> 4
    }

    /// Source node id present
    #[must_use]
    pub fn has_source_node(self) -> bool {
        self.0 & Self::SOURCE_NODE != 0
    }
}

/// Exchange flags byte of the payload header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeFlags(u8);

impl ExchangeFlags {
    /// Sent by the exchange initiator
    pub const INITIATOR: u8 = 0b0000_0001;
    /// Acknowledged message id present
    pub const ACK: u8 = 0b0000_0010;
    /// Sender requests an acknowledgement
    pub const RELIABILITY: u8 = 0b0000_0100;
    /// Secured extensions present
    pub const SECURED_EXTENSIONS: u8 = 0b0000_1000;
    /// Vendor id present
    pub const VENDOR: u8 = 0b0001_0000;

    /// Empty flags
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    /// Wrap a raw byte
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw byte
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Add INITIATOR
    #[must_use]
    pub fn with_initiator(mut self) -> Self {
        self.0 |= Self::INITIATOR;
        self
    }

    /// Add ACK
    #[must_use]
    pub fn with_ack(mut self) -> Self {
        self.0 |= Self::ACK;
        self
    }

    /// Add RELIABILITY
    #[must_use]
    pub fn with_reliability(mut self) -> Self {
        self.0 |= Self::RELIABILITY;
        self
    }

    /// Add VENDOR
    #[must_use]
    pub fn with_vendor(mut self) -> Self {
        self.0 |= Self::VENDOR;
        self
    }

    /// Check INITIATOR
    #[must_use]
    pub fn is_initiator(self) -> bool {
        self.0 & Self::INITIATOR != 0
    }

    /// Check ACK
    #[must_use]
    pub fn is_ack(self) -> bool {
        self.0 & Self::ACK != 0
    }

    /// Check RELIABILITY
    #[must_use]
    pub fn requires_ack(self) -> bool {
        self.0 & Self::RELIABILITY != 0
    }

    /// Check SECURED_EXTENSIONS
    #[must_use]
    pub fn has_secured_extensions(self) -> bool {
        self.0 & Self::SECURED_EXTENSIONS != 0
    }

    /// Check VENDOR
    #[must_use]
    pub fn has_vendor(self) -> bool {
        self.0 & Self::VENDOR != 0
    }
}

/// Session type carried in the security flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionType {
    /// Unicast session
    #[default]
    Unicast = 0,
    /// Group session
    Group = 1,
}

impl SessionType {
    /// Security flags byte for this session type
    #[must_use]
    pub fn security_flags(self) -> u8 {
        self as u8
    }
}

/// Packet destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// 64-bit operational node id
    Node(u64),
    /// 16-bit group id
    Group(u16),
}

/// Unencrypted packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Session id the receiver knows the session by
    pub session_id: u16,
    /// Unicast or group
    pub session_type: SessionType,
    /// Sender's message counter
    pub message_id: u32,
    /// Sender node id
    pub source_node_id: Option<u64>,
    /// Receiver node or group
    pub destination: Option<Destination>,
}

impl PacketHeader {
    /// Message flags byte for this header
    #[must_use]
    pub fn flags(&self) -> PacketFlags {
        let mut flags = PacketFlags::new();
        if self.source_node_id.is_some() {
            flags = flags.with_source_node();
        }
        match self.destination {
            Some(Destination::Node(_)) => flags.with_dest_node(),
            Some(Destination::Group(_)) => flags.with_dest_group(),
            None => flags,
        }
    }

    /// Security flags byte for this header
    #[must_use]
    pub fn security_flags(&self) -> u8 {
        self.session_type.security_flags()
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_MIN_SIZE
            + self.source_node_id.map_or(0, |_| 8)
            + match self.destination {
                Some(Destination::Node(_)) => 8,
                Some(Destination::Group(_)) => 2,
                None => 0,
            }
    }
}

/// Packet header plus the bytes that follow it (ciphertext for secure sessions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Header
    pub header: PacketHeader,
    /// Remaining bytes
    pub payload: Vec<u8>,
}

/// Payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayloadHeader {
    /// Exchange id chosen by the initiator
    pub exchange_id: u16,
    /// Vendor id (upper 16 bits) and protocol number (lower 16 bits)
    pub protocol_id: u32,
    /// Protocol opcode
    pub message_type: u8,
    /// Sent by the exchange initiator
    pub is_initiator: bool,
    /// Sender requests an acknowledgement
    pub requires_ack: bool,
    /// Message id being acknowledged
    pub acked_message_id: Option<u32>,
}

impl PayloadHeader {
    /// Exchange flags byte for this header
    #[must_use]
    pub fn flags(&self) -> ExchangeFlags {
        let mut flags = ExchangeFlags::new();
        if self.is_initiator {
            flags = flags.with_initiator();
        }
        if self.acked_message_id.is_some() {
            flags = flags.with_ack();
        }
        if self.requires_ack {
            flags = flags.with_reliability();
        }
        if self.vendor_id() != 0 {
            flags = flags.with_vendor();
        }
        flags
    }

    /// Vendor part of the protocol id
    #[must_use]
    pub fn vendor_id(&self) -> u16 {
        (self.protocol_id >> 16) as u16
    }
}

/// Decoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Packet header
    pub packet_header: PacketHeader,
    /// Payload header
    pub payload_header: PayloadHeader,
    /// Application payload
    pub payload: Vec<u8>,
}

struct Cursor<'a> {
    what: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(what: &'static str, data: &'a [u8]) -> Self {
        Self { what, data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::TooShort {
                what: self.what,
                expected: end,
                actual: self.data.len(),
            })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Parse a packet header and split off the remaining bytes.
///
/// # Errors
///
/// Returns a [`CodecError`] for truncated input, a non-zero version,
/// reserved or conflicting flags, or unsupported security flags.
pub fn decode_packet(data: &[u8]) -> Result<Packet, CodecError> {
    if data.len() < PACKET_HEADER_MIN_SIZE {
        return Err(CodecError::TooShort {
            what: "packet header",
            expected: PACKET_HEADER_MIN_SIZE,
            actual: data.len(),
        });
    }

    let mut cursor = Cursor::new("packet header", data);
    let flags = PacketFlags::from_byte(cursor.u8()?);
    if flags.version() != 0 {
        return Err(CodecError::UnsupportedVersion(flags.version()));
    }
    if flags.as_u8() & PacketFlags::RESERVED != 0 {
        return Err(CodecError::ReservedFlags(flags.as_u8()));
    }
    let dsiz = flags.as_u8() & PacketFlags::DSIZ_MASK;
    if dsiz == PacketFlags::DSIZ_MASK {
        return Err(CodecError::InvalidDestination(flags.as_u8()));
    }

    let session_id = cursor.u16()?;
    let security_flags = cursor.u8()?;
    let session_type = match security_flags & 0b11 {
        0 => SessionType::Unicast,
        1 => SessionType::Group,
        other => return Err(CodecError::UnsupportedSessionType(other)),
    };
    if security_flags & !0b11 != 0 {
        return Err(CodecError::UnsupportedSecurityFlags(security_flags));
    }
    let message_id = cursor.u32()?;

    let source_node_id = if flags.has_source_node() {
        Some(cursor.u64()?)
    } else {
        None
    };
    let destination = match dsiz {
        PacketFlags::DEST_NODE => Some(Destination::Node(cursor.u64()?)),
        PacketFlags::DEST_GROUP => Some(Destination::Group(cursor.u16()?)),
        _ => None,
    };

    Ok(Packet {
        header: PacketHeader {
            session_id,
            session_type,
            message_id,
            source_node_id,
            destination,
        },
        payload: cursor.rest().to_vec(),
    })
}

/// Serialize a packet header. The result is also the AEAD associated data.
#[must_use]
pub fn encode_packet_header(header: &PacketHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.encoded_len());
    out.push(header.flags().as_u8());
    out.extend_from_slice(&header.session_id.to_le_bytes());
    out.push(header.security_flags());
    out.extend_from_slice(&header.message_id.to_le_bytes());
    if let Some(source) = header.source_node_id {
        out.extend_from_slice(&source.to_le_bytes());
    }
    match header.destination {
        Some(Destination::Node(node)) => out.extend_from_slice(&node.to_le_bytes()),
        Some(Destination::Group(group)) => out.extend_from_slice(&group.to_le_bytes()),
        None => {}
    }
    out
}

/// Serialize a packet: header followed by its payload bytes.
#[must_use]
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut out = encode_packet_header(&packet.header);
    out.extend_from_slice(&packet.payload);
    out
}

/// Parse the payload header of a packet's (decrypted) payload.
///
/// # Errors
///
/// Returns a [`CodecError`] for truncated input, secured extensions or an
/// explicit vendor id of 0.
pub fn decode_payload(packet: &Packet) -> Result<Message, CodecError> {
    let data = &packet.payload;
    if data.len() < PAYLOAD_HEADER_MIN_SIZE {
        return Err(CodecError::TooShort {
            what: "payload header",
            expected: PAYLOAD_HEADER_MIN_SIZE,
            actual: data.len(),
        });
    }

    let mut cursor = Cursor::new("payload header", data);
    let flags = ExchangeFlags::from_byte(cursor.u8()?);
    if flags.has_secured_extensions() {
        return Err(CodecError::SecuredExtensions);
    }
    let message_type = cursor.u8()?;
    let exchange_id = cursor.u16()?;
    let vendor_id = if flags.has_vendor() {
        match cursor.u16()? {
            0 => return Err(CodecError::ZeroVendorId),
            id => id,
        }
    } else {
        0
    };
    let protocol_id = (u32::from(vendor_id) << 16) | u32::from(cursor.u16()?);
    let acked_message_id = if flags.is_ack() {
        Some(cursor.u32()?)
    } else {
        None
    };

    Ok(Message {
        packet_header: packet.header,
        payload_header: PayloadHeader {
            exchange_id,
            protocol_id,
            message_type,
            is_initiator: flags.is_initiator(),
            requires_ack: flags.requires_ack(),
            acked_message_id,
        },
        payload: cursor.rest().to_vec(),
    })
}

/// Serialize a message's payload header and payload into a packet.
#[must_use]
pub fn encode_payload(message: &Message) -> Packet {
    let header = &message.payload_header;
    let mut out = Vec::with_capacity(PAYLOAD_HEADER_MIN_SIZE + 6 + message.payload.len());
    out.push(header.flags().as_u8());
    out.push(header.message_type);
    out.extend_from_slice(&header.exchange_id.to_le_bytes());
    if header.vendor_id() != 0 {
        out.extend_from_slice(&header.vendor_id().to_le_bytes());
    }
    out.extend_from_slice(&((header.protocol_id & 0xFFFF) as u16).to_le_bytes());
    if let Some(acked) = header.acked_message_id {
        out.extend_from_slice(&acked.to_le_bytes());
    }
    out.extend_from_slice(&message.payload);

    Packet {
        header: message.packet_header,
        payload: out,
    }
}
