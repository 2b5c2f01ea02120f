//! Schema-less reader for the protobuf wire format.
//!
//! Spotify's connect-state payloads are protobuf messages for which no
//! descriptors are shipped. [`WireReader`] walks such buffers structurally
//! on top of [`protobuf::CodedInputStream`]: it yields tags and raw values,
//! and lets the caller skip whatever it does not recognize. Length-delimited
//! values come back owned, so nested messages are read by wrapping them in
//! a new reader.
//!
//! # Wire Format
//!
//! Every field starts with a varint tag `(field_number << 3) | wire_type`:
//!
//! | Wire type | Value                         |
//! |-----------|-------------------------------|
//! | 0         | varint                        |
//! | 1         | 8 bytes, little endian        |
//! | 2         | varint length, then bytes     |
//! | 3 / 4     | group start / end (obsolete)  |
//! | 5         | 4 bytes, little endian        |
//!
//! # Example
//!
//! ```rust
//! use vrcosc_spotify::protocol::wire::{WireReader, WireType};
//!
//! # fn main() -> vrcosc_spotify::error::Result<()> {
//! let mut reader = WireReader::new(&[0x08, 0x96, 0x01]);
//! while reader.has_remaining() {
//!     let tag = reader.read_tag()?;
//!     if tag.field == 1 && tag.wire_type == WireType::Varint {
//!         assert_eq!(reader.read_varint()?, 150);
//!     } else {
//!         reader.skip()?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use protobuf::CodedInputStream;

use crate::error::{Error, Result};

/// Encoding of the value that follows a tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl TryFrom<u32> for WireType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            3 => Ok(Self::StartGroup),
            4 => Ok(Self::EndGroup),
            5 => Ok(Self::Fixed32),
            other => Err(Error::invalid_argument(format!(
                "wire type {other} is not valid"
            ))),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Varint => write!(f, "varint"),
            Self::Fixed64 => write!(f, "fixed64"),
            Self::LengthDelimited => write!(f, "length-delimited"),
            Self::StartGroup => write!(f, "start group"),
            Self::EndGroup => write!(f, "end group"),
            Self::Fixed32 => write!(f, "fixed32"),
        }
    }
}

/// A decoded field key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Tag {
    /// Field number, always 1 or greater.
    pub field: u32,
    pub wire_type: WireType,
}

impl Tag {
    /// Largest field number protobuf allows.
    pub const MAX_FIELD: u32 = (1 << 29) - 1;
}

impl TryFrom<u32> for Tag {
    type Error = Error;

    fn try_from(key: u32) -> Result<Self> {
        let wire_type = WireType::try_from(key & 0x07)?;
        let field = key >> 3;
        if field == 0 {
            return Err(Error::invalid_argument("field number 0 is reserved"));
        }

        Ok(Self { field, wire_type })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.field, self.wire_type)
    }
}

/// Raw value of a field, still uninterpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WireValue {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    /// Length-delimited bytes. Groups are reported as empty bytes.
    Bytes(Vec<u8>),
}

/// A field produced while walking a buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WireField {
    pub field: u32,
    pub value: WireValue,
}

impl WireField {
    /// Returns the value when this field is a varint.
    #[must_use]
    pub fn as_varint(&self) -> Option<u64> {
        match self.value {
            WireValue::Varint(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the bytes when this field is length-delimited.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            WireValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Cursor over a protobuf-encoded buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    input: CodedInputStream<'a>,
    last_tag: Option<Tag>,
}

impl<'a> WireReader<'a> {
    /// Groups are obsolete, but still bound the recursion when skipping them.
    const MAX_GROUP_DEPTH: usize = 32;

    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            input: CodedInputStream::from_bytes(buf),
            last_tag: None,
        }
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_remaining(&mut self) -> bool {
        matches!(self.input.eof(), Ok(false))
    }

    /// Current offset into the buffer.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.input.pos()
    }

    /// The tag returned by the last successful [`read_tag`](Self::read_tag).
    #[must_use]
    pub fn last_tag(&self) -> Option<Tag> {
        self.last_tag
    }

    /// Iterates over the remaining fields, ending after the first error.
    pub fn fields(&mut self) -> Fields<'_, 'a> {
        Fields {
            reader: self,
            failed: false,
        }
    }

    /// Reads the next field key.
    ///
    /// # Errors
    ///
    /// Fails at the end of the buffer, on a truncated varint, an unknown
    /// wire type or field number zero.
    pub fn read_tag(&mut self) -> Result<Tag> {
        self.last_tag = None;

        let start = self.position();
        let key = self
            .input
            .read_raw_tag_or_eof()?
            .ok_or_else(|| Error::data_loss(format!("no tag at offset {start}")))?;
        let tag = Tag::try_from(key)
            .map_err(|e| Error::invalid_argument(format!("{e} at offset {start}")))?;

        self.last_tag = Some(tag);
        Ok(tag)
    }

    /// Reads a base-128 varint.
    ///
    /// # Errors
    ///
    /// Fails when the buffer ends before the last byte, or when the varint
    /// is longer than ten bytes.
    pub fn read_varint(&mut self) -> Result<u64> {
        Ok(self.input.read_raw_varint64()?)
    }

    /// Reads four little endian bytes.
    ///
    /// # Errors
    ///
    /// Fails when fewer than four bytes remain.
    pub fn read_fixed32(&mut self) -> Result<u32> {
        Ok(self.input.read_fixed32()?)
    }

    /// Reads eight little endian bytes.
    ///
    /// # Errors
    ///
    /// Fails when fewer than eight bytes remain.
    pub fn read_fixed64(&mut self) -> Result<u64> {
        Ok(self.input.read_fixed64()?)
    }

    /// Reads length-prefixed bytes.
    ///
    /// # Errors
    ///
    /// Fails when the length prefix is truncated or points past the end of
    /// the buffer.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(self.input.read_bytes()?)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails like [`read_bytes`](Self::read_bytes), or when the bytes are not
    /// valid UTF-8.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8(bytes).map_err(|e| e.utf8_error())?)
    }

    /// Skips the value of the last-read tag.
    ///
    /// # Errors
    ///
    /// Fails when no tag was read, when the value is truncated, or when a
    /// group is not terminated by a matching end tag.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self
            .last_tag
            .take()
            .ok_or_else(|| Error::failed_precondition("no tag to skip the value of"))?;
        let result = self.skip_value(tag, 0);
        self.last_tag = None;
        result
    }

    /// Reads the next tag and its value.
    ///
    /// # Errors
    ///
    /// Fails on any malformed tag or value.
    pub fn read_field(&mut self) -> Result<WireField> {
        let tag = self.read_tag()?;
        let value = match tag.wire_type {
            WireType::Varint => WireValue::Varint(self.read_varint()?),
            WireType::Fixed64 => WireValue::Fixed64(self.read_fixed64()?),
            WireType::Fixed32 => WireValue::Fixed32(self.read_fixed32()?),
            WireType::LengthDelimited => WireValue::Bytes(self.read_bytes()?),
            WireType::StartGroup | WireType::EndGroup => {
                self.skip()?;
                WireValue::Bytes(Vec::new())
            }
        };

        Ok(WireField {
            field: tag.field,
            value,
        })
    }

    fn skip_value(&mut self, tag: Tag, depth: usize) -> Result<()> {
        match tag.wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.read_fixed64().map(drop),
            WireType::Fixed32 => self.read_fixed32().map(drop),
            WireType::LengthDelimited => {
                let len = self.input.read_raw_varint32()?;
                Ok(self.input.skip_raw_bytes(len)?)
            }
            WireType::StartGroup => {
                if depth >= Self::MAX_GROUP_DEPTH {
                    return Err(Error::resource_exhausted("groups nested too deeply"));
                }

                loop {
                    if !self.has_remaining() {
                        return Err(Error::data_loss(format!(
                            "group {} is not terminated",
                            tag.field
                        )));
                    }

                    let inner = self.read_tag()?;
                    if inner.wire_type == WireType::EndGroup {
                        if inner.field != tag.field {
                            return Err(Error::invalid_argument(format!(
                                "group {} terminated by end tag {}",
                                tag.field, inner.field
                            )));
                        }
                        return Ok(());
                    }

                    self.skip_value(inner, depth + 1)?;
                }
            }
            WireType::EndGroup => Err(Error::invalid_argument(format!(
                "unexpected end of group {}",
                tag.field
            ))),
        }
    }
}

/// Iterator returned by [`WireReader::fields`].
#[derive(Debug)]
pub struct Fields<'r, 'a> {
    reader: &'r mut WireReader<'a>,
    failed: bool,
}

impl Iterator for Fields<'_, '_> {
    type Item = Result<WireField>;

    fn next(&mut self) -> Option<Self::Item> {
        // Do not try to resynchronize in the middle of a value.
        if self.failed || !self.reader.has_remaining() {
            return None;
        }

        let field = self.reader.read_field();
        self.failed = field.is_err();
        Some(field)
    }
}
