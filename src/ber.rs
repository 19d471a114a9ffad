// BER reader/writer used by the filter codec.
// Covers the subset of X.690 that RFC 4511 filters need: single-byte tags,
// definite lengths, OCTET STRING, BOOLEAN, NULL and constructed envelopes.

use crate::error::{FilterError, Result};
use std::io::{Cursor, Read};

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_SEQUENCE: u8 = 0x30;

/// Cursor over a borrowed BER buffer.
///
/// `read_sequence` leaves the cursor at the first content byte of the
/// envelope and records its length, so callers can bound nested reads with
/// `offset() + length()`.
pub struct BerReader<'a> {
    cursor: Cursor<&'a [u8]>,
    length: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            length: 0,
        }
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Content length of the most recently read envelope.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.offset())
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.cursor.get_ref().get(self.offset()).copied()
    }

    pub fn read_tag(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| FilterError::ber("BER truncated: missing tag"))?;
        Ok(buf[0])
    }

    pub fn read_length(&mut self) -> Result<usize> {
        let mut buf = [0u8; 1];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| FilterError::ber("BER truncated: missing length"))?;
        let first_byte = buf[0];

        if (first_byte & 0x80) == 0 {
            // Short form
            return Ok(first_byte as usize);
        }

        // Long form
        let length_bytes = (first_byte & 0x7F) as usize;
        if length_bytes == 0 {
            return Err(FilterError::ber("Indefinite length not supported"));
        }
        if length_bytes > 4 {
            return Err(FilterError::ber(format!("Length too large: {} bytes", length_bytes)));
        }
        if self.remaining() < length_bytes {
            return Err(FilterError::ber(format!(
                "BER truncated: length encoding needs {} bytes, {} remaining",
                length_bytes,
                self.remaining()
            )));
        }
        let mut length = 0u32;
        for _ in 0..length_bytes {
            self.cursor
                .read_exact(&mut buf)
                .map_err(|_| FilterError::ber("BER truncated: length"))?;
            length = (length << 8) | buf[0] as u32;
        }
        Ok(length as usize)
    }

    /// Read a tag and length header and return the tag. The content length is
    /// available through `length()` and is checked against the buffer.
    pub fn read_sequence(&mut self) -> Result<u8> {
        let tag = self.read_tag()?;
        let length = self.read_length()?;
        if self.remaining() < length {
            return Err(FilterError::ber(format!(
                "BER truncated: element 0x{:02x} needs {} bytes, {} remaining",
                tag,
                length,
                self.remaining()
            )));
        }
        self.length = length;
        Ok(tag)
    }

    /// Read a header and fail unless it carries `expected`.
    pub fn expect_sequence(&mut self, expected: u8, context: &'static str) -> Result<usize> {
        let tag = self.read_sequence()?;
        if tag != expected {
            return Err(FilterError::TagMismatch {
                context,
                expected,
                found: tag,
            });
        }
        Ok(self.length)
    }

    /// Read a primitive element tagged `tag` and return its content bytes.
    pub fn read_octet_string(&mut self, tag: u8, context: &'static str) -> Result<Vec<u8>> {
        let length = self.expect_sequence(tag, context)?;
        Ok(self.read_raw_bytes(length)?.to_vec())
    }

    pub fn read_string(&mut self, tag: u8, context: &'static str) -> Result<String> {
        let bytes = self.read_octet_string(tag, context)?;
        String::from_utf8(bytes)
            .map_err(|_| FilterError::ber(format!("{} is not valid UTF-8", context)))
    }

    pub fn read_boolean(&mut self, tag: u8, context: &'static str) -> Result<bool> {
        let length = self.expect_sequence(tag, context)?;
        if length != 1 {
            return Err(FilterError::ber(format!(
                "Boolean value must be 1 byte, got: {}",
                length
            )));
        }
        let b = self.read_raw_bytes(1)?;
        Ok(b[0] != 0)
    }

    pub fn read_null(&mut self) -> Result<()> {
        let length = self.expect_sequence(TAG_NULL, "null")?;
        if length != 0 {
            return Err(FilterError::ber(format!("Null value must be empty, got: {} bytes", length)));
        }
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_raw_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FilterError::ber(format!(
                "BER truncated: need {} bytes, {} remaining",
                n,
                self.remaining()
            )));
        }
        let start = self.offset();
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + n) as u64);
        Ok(&data[start..start + n])
    }
}

/// BER writer. Constructed elements are opened with `start_sequence` and
/// closed with `end_sequence`; their lengths are patched in on close, in
/// minimal form.
#[derive(Debug, Default)]
pub struct BerWriter {
    buffer: Vec<u8>,
    open: Vec<usize>,
}

impl BerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_tag(&mut self, tag: u8) {
        self.buffer.push(tag);
    }

    fn write_length(&mut self, length: usize) {
        let bytes = encode_length(length);
        self.buffer.extend_from_slice(&bytes);
    }

    /// Write a primitive element with an arbitrary tag.
    pub fn write_octet_string(&mut self, tag: u8, data: &[u8]) {
        self.write_tag(tag);
        self.write_length(data.len());
        self.buffer.extend_from_slice(data);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_octet_string(TAG_OCTET_STRING, s.as_bytes());
    }

    pub fn write_boolean(&mut self, tag: u8, value: bool) {
        self.write_tag(tag);
        self.write_length(1);
        self.buffer.push(if value { 0xFF } else { 0x00 });
    }

    pub fn write_null(&mut self) {
        self.write_tag(TAG_NULL);
        self.write_length(0);
    }

    pub fn start_sequence(&mut self, tag: u8) {
        self.write_tag(tag);
        self.open.push(self.buffer.len());
        self.buffer.push(0); // Placeholder for length
    }

    pub fn end_sequence(&mut self) {
        let Some(length_pos) = self.open.pop() else {
            return;
        };
        let content_len = self.buffer.len() - (length_pos + 1);
        let bytes = encode_length(content_len);
        self.buffer.splice(length_pos..length_pos + 1, bytes);
    }

    /// Append an already encoded element.
    pub fn append_buffer(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }
}

fn encode_length(length: usize) -> Vec<u8> {
    if length < 128 {
        // Short form
        return vec![length as u8];
    }
    // Long form
    let mut bytes = Vec::new();
    let mut len = length;
    while len > 0 {
        bytes.push((len & 0xFF) as u8);
        len >>= 8;
    }
    bytes.push(0x80 | bytes.len() as u8);
    bytes.reverse();
    bytes
}
