// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A printable binary-to-text encoding over the 94 visible ASCII characters `!` to `~`.
//!
//! Bits are consumed 13 at a time, or 14 when the low 13 bits are small enough that the
//! 14-bit value still fits in two symbols (94 * 94 = 8836). Each group is written as two
//! symbols, low digit first.

use std::io::{self, Write};
use thiserror::Error;

const FIRST_SYMBOL: u8 = b'!';
const BASE: u32 = 94;
// 94 * 94 - 8192
const WIDE_GROUP_LIMIT: u32 = 644;

fn symbol(digit: u32) -> u8 {
    // digit < BASE
    FIRST_SYMBOL + digit as u8
}

/// Encodes everything written to it into the inner writer.
#[derive(Debug)]
pub struct Base94Encoder<W: Write> {
    inner: W,
    queue: u32,
    nbits: u32,
}

impl<W: Write> Base94Encoder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            queue: 0,
            nbits: 0,
        }
    }

    /// Writes the pending bits and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.nbits > 0 {
            let mut tail = vec![symbol(self.queue % BASE)];
            if self.nbits > 7 || self.queue >= BASE {
                tail.push(symbol(self.queue / BASE));
            }
            self.inner.write_all(&tail)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Base94Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::with_capacity(buf.len() * 2);
        for &byte in buf {
            self.queue |= u32::from(byte) << self.nbits;
            self.nbits += 8;
            if self.nbits > 13 {
                let mut value = self.queue & 0x1fff;
                if value < WIDE_GROUP_LIMIT {
                    value = self.queue & 0x3fff;
                    self.queue >>= 14;
                    self.nbits -= 14;
                } else {
                    self.queue >>= 13;
                    self.nbits -= 13;
                }
                out.push(symbol(value % BASE));
                out.push(symbol(value / BASE));
            }
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid symbol {symbol:?} at offset {offset}")]
    InvalidSymbol { symbol: char, offset: usize },
}

/// Decodes text produced by [`Base94Encoder`]. ASCII whitespace, such as the line breaks of
/// a log stream, is skipped.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(text.len() * 13 / 16);
    let mut pending: Option<u32> = None;
    let mut queue: u32 = 0;
    let mut nbits: u32 = 0;

    for (offset, symbol) in text.char_indices() {
        if symbol.is_ascii_whitespace() {
            continue;
        }
        let digit = match symbol {
            '!'..='~' => symbol as u32 - u32::from(FIRST_SYMBOL),
            _ => return Err(DecodeError::InvalidSymbol { symbol, offset }),
        };
        match pending.take() {
            None => pending = Some(digit),
            Some(low) => {
                let value = low + digit * BASE;
                queue |= value << nbits;
                nbits += if value & 0x1fff < WIDE_GROUP_LIMIT { 14 } else { 13 };
                while nbits > 7 {
                    out.push(queue as u8);
                    queue >>= 8;
                    nbits -= 8;
                }
            }
        }
    }
    if let Some(low) = pending {
        out.push((queue | low << nbits) as u8);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> String {
        let mut encoder = Base94Encoder::new(Vec::new());
        encoder.write_all(data).unwrap();
        String::from_utf8(encoder.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_alphabet_is_printable() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let encoded = encode(&data);
        assert!(encoded.bytes().all(|b| (b'!'..=b'~').contains(&b)));
        // 13 or 14 bits per pair of symbols
        assert!(encoded.len() <= data.len() * 16 / 13 + 2);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_short_inputs() {
        for data in [&b""[..], b"\0", b"a", b"ab", b"\xff\xff\xff", b"\0\0\0\0\0"] {
            assert_eq!(decode(&encode(data)).unwrap(), data, "{data:?}");
        }
    }

    #[test]
    fn test_split_writes_match_single_write() {
        let data = b"the crashed process left this behind";
        let mut encoder = Base94Encoder::new(Vec::new());
        for chunk in data.chunks(3) {
            encoder.write_all(chunk).unwrap();
        }
        let split = String::from_utf8(encoder.finish().unwrap()).unwrap();
        assert_eq!(split, encode(data));
    }

    #[test]
    fn test_decode_skips_line_breaks() {
        let encoded = encode(b"line broken payload");
        let (head, tail) = encoded.split_at(7);
        assert_eq!(
            decode(&format!("{head}\n{tail}\n")).unwrap(),
            b"line broken payload"
        );
    }

    #[test]
    fn test_decode_rejects_foreign_symbols() {
        assert_eq!(
            decode("ab\u{7f}").unwrap_err(),
            DecodeError::InvalidSymbol {
                symbol: '\u{7f}',
                offset: 2
            }
        );
    }
}
