//! Untyped TLV elements and the binary codec.

use super::MAX_NESTING_DEPTH;
use crate::error::TlvError;
use std::fmt;

const TYPE_SIGNED: u8 = 0x00;
const TYPE_UNSIGNED: u8 = 0x04;
const TYPE_FALSE: u8 = 0x08;
const TYPE_TRUE: u8 = 0x09;
const TYPE_FLOAT: u8 = 0x0A;
const TYPE_DOUBLE: u8 = 0x0B;
const TYPE_UTF8: u8 = 0x0C;
const TYPE_BYTES: u8 = 0x10;
const TYPE_NULL: u8 = 0x14;
const TYPE_STRUCTURE: u8 = 0x15;
const TYPE_ARRAY: u8 = 0x16;
const TYPE_LIST: u8 = 0x17;
const TYPE_END_OF_CONTAINER: u8 = 0x18;

/// Element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// No tag (array members, top-level structures)
    Anonymous,
    /// Context-specific tag, meaningful only inside its structure
    Context(u8),
    /// Tag in the common profile
    CommonProfile(u32),
    /// Tag in the profile implied by the message
    ImplicitProfile(u32),
    /// Vendor and profile qualified tag
    FullyQualified {
        /// Vendor id
        vendor_id: u16,
        /// Profile number
        profile: u16,
        /// Tag number
        tag: u32,
    },
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Context(id) => write!(f, "context {id}"),
            Self::CommonProfile(id) => write!(f, "common profile {id}"),
            Self::ImplicitProfile(id) => write!(f, "implicit profile {id}"),
            Self::FullyQualified {
                vendor_id,
                profile,
                tag,
            } => write!(f, "{vendor_id:04X}:{profile:04X}:{tag}"),
        }
    }
}

/// Element value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer
    Signed(i64),
    /// Unsigned integer
    Unsigned(u64),
    /// Boolean
    Bool(bool),
    /// Single precision float
    Float(f32),
    /// Double precision float
    Double(f64),
    /// UTF-8 string
    Utf8(String),
    /// Octet string
    Bytes(Vec<u8>),
    /// Null
    Null,
    /// Structure: members with unique tags
    Structure(Vec<Element>),
    /// Array: anonymous members
    Array(Vec<Element>),
    /// List: ordered members with arbitrary tags
    List(Vec<Element>),
}

/// A tagged TLV element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element tag
    pub tag: Tag,
    /// Element value
    pub value: Value,
}

impl Element {
    /// Create an element.
    #[must_use]
    pub fn new(tag: Tag, value: Value) -> Self {
        Self { tag, value }
    }

    /// Anonymous structure, the usual top-level message element.
    #[must_use]
    pub fn structure(members: Vec<Element>) -> Self {
        Self::new(Tag::Anonymous, Value::Structure(members))
    }

    /// Context-tagged member.
    #[must_use]
    pub fn context(id: u8, value: Value) -> Self {
        Self::new(Tag::Context(id), value)
    }

    /// Find a structure member by context tag.
    #[must_use]
    pub fn member(&self, id: u8) -> Option<&Element> {
        match &self.value {
            Value::Structure(members) | Value::List(members) => {
                members.iter().find(|m| m.tag == Tag::Context(id))
            }
            _ => None,
        }
    }
}

/// Encode an element tree.
#[must_use]
pub fn encode(element: &Element) -> Vec<u8> {
    let mut writer = TlvWriter::default();
    writer.write(element);
    writer.into_bytes()
}

/// Decode exactly one element tree from `data`.
///
/// # Errors
///
/// Returns a [`TlvError`] for truncated input, invalid control bytes,
/// excessive nesting, or trailing bytes after the element.
pub fn decode(data: &[u8]) -> Result<Element, TlvError> {
    let mut reader = TlvReader::new(data);
    let element = reader.read_element(0)?;
    if reader.remaining() != 0 {
        return Err(TlvError::TrailingBytes(reader.remaining()));
    }
    Ok(element)
}

/// Width class index for an unsigned magnitude: 0 => 1 byte, 1 => 2,
/// 2 => 4, 3 => 8.
fn unsigned_width(value: u64) -> u8 {
    if value < 1 << 8 {
        0
    } else if value < 1 << 16 {
        1
    } else if value < 1 << 32 {
        2
    } else {
        3
    }
}

fn signed_width(value: i64) -> u8 {
    if i64::from(i8::MIN) <= value && value <= i64::from(i8::MAX) {
        0
    } else if i64::from(i16::MIN) <= value && value <= i64::from(i16::MAX) {
        1
    } else if i64::from(i32::MIN) <= value && value <= i64::from(i32::MAX) {
        2
    } else {
        3
    }
}

/// Streaming element writer.
#[derive(Debug, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    /// Consume the writer and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append one element (recursively for containers).
    pub fn write(&mut self, element: &Element) {
        let tag = element.tag;
        match &element.value {
            Value::Signed(v) => {
                let width = signed_width(*v);
                self.control(tag, TYPE_SIGNED | width);
                let bytes = v.to_le_bytes();
                self.buf.extend_from_slice(&bytes[..1 << width]);
            }
            Value::Unsigned(v) => {
                let width = unsigned_width(*v);
                self.control(tag, TYPE_UNSIGNED | width);
                let bytes = v.to_le_bytes();
                self.buf.extend_from_slice(&bytes[..1 << width]);
            }
            Value::Bool(b) => self.control(tag, if *b { TYPE_TRUE } else { TYPE_FALSE }),
            Value::Float(v) => {
                self.control(tag, TYPE_FLOAT);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Double(v) => {
                self.control(tag, TYPE_DOUBLE);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Utf8(s) => self.string(tag, TYPE_UTF8, s.as_bytes()),
            Value::Bytes(b) => self.string(tag, TYPE_BYTES, b),
            Value::Null => self.control(tag, TYPE_NULL),
            Value::Structure(members) => self.container(tag, TYPE_STRUCTURE, members),
            Value::Array(members) => self.container(tag, TYPE_ARRAY, members),
            Value::List(members) => self.container(tag, TYPE_LIST, members),
        }
    }

    fn string(&mut self, tag: Tag, base: u8, data: &[u8]) {
        let len = data.len() as u64;
        let width = unsigned_width(len);
        self.control(tag, base | width);
        self.buf.extend_from_slice(&len.to_le_bytes()[..1 << width]);
        self.buf.extend_from_slice(data);
    }

    fn container(&mut self, tag: Tag, element_type: u8, members: &[Element]) {
        self.control(tag, element_type);
        for member in members {
            self.write(member);
        }
        self.buf.push(TYPE_END_OF_CONTAINER);
    }

    fn control(&mut self, tag: Tag, element_type: u8) {
        match tag {
            Tag::Anonymous => self.buf.push(element_type),
            Tag::Context(id) => {
                self.buf.push(1 << 5 | element_type);
                self.buf.push(id);
            }
            Tag::CommonProfile(id) => self.profile_tag(2, element_type, id),
            Tag::ImplicitProfile(id) => self.profile_tag(4, element_type, id),
            Tag::FullyQualified {
                vendor_id,
                profile,
                tag,
            } => {
                let wide = u16::try_from(tag).is_err();
                self.buf.push((if wide { 7 } else { 6 }) << 5 | element_type);
                self.buf.extend_from_slice(&vendor_id.to_le_bytes());
                self.buf.extend_from_slice(&profile.to_le_bytes());
                if wide {
                    self.buf.extend_from_slice(&tag.to_le_bytes());
                } else {
                    self.buf.extend_from_slice(&(tag as u16).to_le_bytes());
                }
            }
        }
    }

    fn profile_tag(&mut self, short_control: u8, element_type: u8, id: u32) {
        match u16::try_from(id) {
            Ok(short) => {
                self.buf.push(short_control << 5 | element_type);
                self.buf.extend_from_slice(&short.to_le_bytes());
            }
            Err(_) => {
                self.buf.push((short_control + 1) << 5 | element_type);
                self.buf.extend_from_slice(&id.to_le_bytes());
            }
        }
    }
}

/// Element reader over a byte slice.
#[derive(Debug)]
pub struct TlvReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    /// Create a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlvError> {
        if self.remaining() < n {
            return Err(TlvError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, TlvError> {
        Ok(self.take(1)?[0])
    }

    fn le(&mut self, n: usize) -> Result<u64, TlvError> {
        let bytes = self.take(n)?;
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn tag(&mut self, control: u8) -> Result<Tag, TlvError> {
        Ok(match control {
            0 => Tag::Anonymous,
            1 => Tag::Context(self.u8()?),
            2 => Tag::CommonProfile(self.le(2)? as u32),
            3 => Tag::CommonProfile(self.le(4)? as u32),
            4 => Tag::ImplicitProfile(self.le(2)? as u32),
            5 => Tag::ImplicitProfile(self.le(4)? as u32),
            6 | 7 => {
                let vendor_id = self.le(2)? as u16;
                let profile = self.le(2)? as u16;
                let tag = self.le(if control == 6 { 2 } else { 4 })? as u32;
                Tag::FullyQualified {
                    vendor_id,
                    profile,
                    tag,
                }
            }
            other => return Err(TlvError::InvalidTagControl(other)),
        })
    }

    /// Read one element; `depth` is the number of enclosing containers.
    ///
    /// # Errors
    ///
    /// See [`decode`].
    pub fn read_element(&mut self, depth: usize) -> Result<Element, TlvError> {
        let start = self.pos;
        let control = self.u8()?;
        let element_type = control & 0x1F;
        if element_type == TYPE_END_OF_CONTAINER {
            return Err(TlvError::UnexpectedEndOfContainer(start));
        }
        let tag = self.tag(control >> 5)?;

        let value = match element_type {
            0x00..=0x03 => {
                let width = 1usize << element_type;
                let raw = self.le(width)?;
                // Sign-extend from the encoded width.
                let shift = 64 - 8 * width as u32;
                Value::Signed(((raw << shift) as i64) >> shift)
            }
            0x04..=0x07 => Value::Unsigned(self.le(1 << (element_type - TYPE_UNSIGNED))?),
            TYPE_FALSE => Value::Bool(false),
            TYPE_TRUE => Value::Bool(true),
            TYPE_FLOAT => Value::Float(f32::from_bits(self.le(4)? as u32)),
            TYPE_DOUBLE => Value::Double(f64::from_bits(self.le(8)?)),
            0x0C..=0x0F => {
                let bytes = self.string(element_type - TYPE_UTF8)?;
                let s = std::str::from_utf8(bytes).map_err(|_| TlvError::InvalidUtf8)?;
                Value::Utf8(s.to_owned())
            }
            0x10..=0x13 => Value::Bytes(self.string(element_type - TYPE_BYTES)?.to_vec()),
            TYPE_NULL => Value::Null,
            TYPE_STRUCTURE => Value::Structure(self.members(depth)?),
            TYPE_ARRAY => Value::Array(self.members(depth)?),
            TYPE_LIST => Value::List(self.members(depth)?),
            other => return Err(TlvError::InvalidElementType(other)),
        };

        Ok(Element { tag, value })
    }

    fn string(&mut self, width_class: u8) -> Result<&'a [u8], TlvError> {
        let len = self.le(1 << width_class)?;
        let len = usize::try_from(len).map_err(|_| TlvError::Truncated {
            offset: self.pos,
            needed: usize::MAX,
        })?;
        self.take(len)
    }

    fn members(&mut self, depth: usize) -> Result<Vec<Element>, TlvError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(TlvError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let mut members = Vec::new();
        loop {
            let control = *self.data.get(self.pos).ok_or(TlvError::Truncated {
                offset: self.pos,
                needed: 1,
            })?;
            if control & 0x1F == TYPE_END_OF_CONTAINER {
                if control >> 5 != 0 {
                    return Err(TlvError::InvalidTagControl(control >> 5));
                }
                self.pos += 1;
                return Ok(members);
            }
            members.push(self.read_element(depth + 1)?);
        }
    }
}
