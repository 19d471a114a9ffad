//! RFC 4515 value escaping.
//!
//! Escaping works on raw bytes, not on characters: 2- and 3-byte UTF-8
//! sequences are written out as one `\XX` pair per byte, control bytes and
//! the four filter metacharacters `* ( ) \` are always escaped, printable
//! ASCII is copied through.

use crate::error::{FilterError, Result};

/// Escape a raw attribute value for use inside a filter string.
///
/// 4-byte UTF-8 sequences are not grouped like 2- and 3-byte ones. A complete,
/// valid 4-byte sequence is emitted as its literal character; any byte that
/// cannot be emitted as text (stray continuation bytes, truncated sequences,
/// bytes above 0xF7) is emitted as `\XX`. Either way `unescape` restores the
/// original bytes.
pub fn escape(value: impl AsRef<[u8]>) -> String {
    let buf = value.as_ref();
    let mut out = String::with_capacity(buf.len());
    let mut i = 0;

    while i < buf.len() {
        let b = buf[i];

        let seq_len = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            _ => 1,
        };
        if seq_len > 1 {
            let end = (i + seq_len).min(buf.len());
            for &byte in &buf[i..end] {
                push_hex(&mut out, byte);
            }
            i = end;
            continue;
        }

        match b {
            0x00..=0x1F => push_hex(&mut out, b),
            b'*' => out.push_str("\\2a"),
            b'(' => out.push_str("\\28"),
            b')' => out.push_str("\\29"),
            b'\\' => out.push_str("\\5c"),
            0x20..=0x7F => out.push(b as char),
            0xF0..=0xF7 => match four_byte_char(&buf[i..]) {
                Some(ch) => {
                    out.push(ch);
                    i += 4;
                    continue;
                }
                None => push_hex(&mut out, b),
            },
            _ => push_hex(&mut out, b),
        }
        i += 1;
    }

    out
}

/// Decode `\XX` hex escapes back to raw bytes. Unescaped characters are
/// copied as their UTF-8 bytes.
pub fn unescape(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hi = bytes.get(i + 1).copied().and_then(hex_digit);
            let lo = bytes.get(i + 2).copied().and_then(hex_digit);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                _ => {
                    let shown: String = text[i..].chars().take(3).collect();
                    return Err(FilterError::parse(format!("invalid escaped char: {}", shown)));
                }
            }
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    Ok(out)
}

fn push_hex(out: &mut String, byte: u8) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.push('\\');
    out.push(HEX[(byte >> 4) as usize] as char);
    out.push(HEX[(byte & 0x0F) as usize] as char);
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn four_byte_char(buf: &[u8]) -> Option<char> {
    let seq = buf.get(..4)?;
    std::str::from_utf8(seq).ok()?.chars().next()
}
