//! Primitive wire codec
//!
//! All integers are little-endian. Text is written as a one-byte length,
//! the UTF-8 bytes, and a trailing zero byte, so a text field always costs
//! `len + 2` bytes on the wire.

use thiserror::Error;

/// Longest text payload that fits the one-byte length prefix
pub const MAX_TEXT_LEN: usize = u8::MAX as usize;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("needed {needed} bytes at offset {offset}, only {available} available")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("text is {0} bytes, limit is 255")]
    TextTooLong(usize),
    #[error("text terminator at offset {0} is not zero")]
    MissingTerminator(usize),
    #[error("text is not valid UTF-8")]
    InvalidText,
    #[error("invalid {what} value {value}")]
    InvalidValue { what: &'static str, value: u8 },
    #[error("seek to {target} is outside a buffer of {len} bytes")]
    SeekOutOfRange { target: usize, len: usize },
}

/// Growable output buffer with a write cursor
#[derive(Debug, Default, Clone)]
pub struct WriteMessage {
    buffer: Vec<u8>,
}

impl WriteMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    pub fn byte_position(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed, zero-terminated text field.
    ///
    /// Nothing is written when the text is too long.
    pub fn write_text(&mut self, text: &str) -> Result<(), CodecError> {
        let bytes = text.as_bytes();
        if bytes.len() > MAX_TEXT_LEN {
            return Err(CodecError::TextTooLong(bytes.len()));
        }
        self.write_u8(bytes.len() as u8);
        self.write_bytes(bytes);
        self.write_u8(0);
        Ok(())
    }

    /// Overwrites a previously reserved u16 slot at `offset`
    pub fn patch_u16(&mut self, offset: usize, value: u16) -> Result<(), CodecError> {
        let len = self.buffer.len();
        let slot = self
            .buffer
            .get_mut(offset..offset + 2)
            .ok_or(CodecError::SeekOutOfRange {
                target: offset + 2,
                len,
            })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Borrowed input buffer with a read cursor
///
/// Failed reads leave the cursor where it was.
#[derive(Debug, Clone)]
pub struct ReadMessage<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ReadMessage<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn byte_position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < count {
            return Err(CodecError::UnexpectedEnd {
                offset: self.position,
                needed: count,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => {
                self.position -= 1;
                Err(CodecError::InvalidValue {
                    what: "bool",
                    value,
                })
            }
        }
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        self.take(count)
    }

    pub fn read_text(&mut self) -> Result<String, CodecError> {
        let start = self.position;
        let result = self.read_text_inner();
        if result.is_err() {
            self.position = start;
        }
        result
    }

    fn read_text_inner(&mut self) -> Result<String, CodecError> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        let terminator_at = self.position;
        if self.read_u8()? != 0 {
            return Err(CodecError::MissingTerminator(terminator_at));
        }
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidText)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), CodecError> {
        self.take(count).map(|_| ())
    }

    /// Moves the cursor to an absolute offset (end of buffer allowed)
    pub fn seek(&mut self, target: usize) -> Result<(), CodecError> {
        if target > self.buffer.len() {
            return Err(CodecError::SeekOutOfRange {
                target,
                len: self.buffer.len(),
            });
        }
        self.position = target;
        Ok(())
    }
}
