//! Turning raw output chunks into sink text.

use crate::error::{Error, Result};
use std::fmt;

/// Text encodings understood for child output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD instead of failing.
    Utf8Lossy,
    Ascii,
    Latin1,
}

impl Encoding {
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-8-lossy" | "utf8-lossy" => Ok(Encoding::Utf8Lossy),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            _ => Err(Error::UnknownEncoding(label.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Lossy => "utf-8-lossy",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "latin-1",
        };
        f.write_str(label)
    }
}

/// Incremental decoder for one output stream.
///
/// Multi-byte sequences split across reads are carried over to the next
/// chunk, and a `\r\n` pair split across reads still yields a single `\n`.
#[derive(Debug)]
pub struct Decoder {
    encoding: Encoding,
    carry: Vec<u8>,
    last_was_cr: bool,
}

impl Decoder {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            carry: Vec::new(),
            last_was_cr: false,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decodes a chunk into newline-normalized text.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String> {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let text = match self.encoding {
            Encoding::Utf8 | Encoding::Utf8Lossy => {
                let split = bytes.len() - incomplete_utf8_tail(&bytes);
                self.carry = bytes.split_off(split);
                self.decode_utf8(bytes)?
            }
            Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(pos) => {
                    return Err(self.decode_error(format!(
                        "byte 0x{:02x} at position {} is not ascii",
                        bytes[pos], pos
                    )))
                }
                None => bytes.iter().map(|&b| b as char).collect(),
            },
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        };
        Ok(self.normalize(&text))
    }

    /// Decodes whatever was held back waiting for the rest of a sequence.
    pub fn flush(&mut self) -> Option<Result<String>> {
        if self.carry.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.carry);
        Some(self.decode_utf8(bytes).map(|text| self.normalize(&text)))
    }

    fn decode_utf8(&self, bytes: Vec<u8>) -> Result<String> {
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) if self.encoding == Encoding::Utf8Lossy => {
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
            Err(e) => Err(self.decode_error(e.utf8_error().to_string())),
        }
    }

    fn decode_error(&self, reason: String) -> Error {
        Error::Decode {
            encoding: self.encoding.to_string(),
            reason,
        }
    }

    fn normalize(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\r' => {
                    out.push('\n');
                    self.last_was_cr = true;
                    continue;
                }
                '\n' if self.last_was_cr => {}
                c => out.push(c),
            }
            self.last_was_cr = false;
        }
        out
    }
}

/// Length of a trailing, not yet complete, UTF-8 sequence.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        let width = match byte {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if back < width { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(Encoding::from_label("UTF-8").unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::from_label("iso_8859_1").unwrap(), Encoding::Latin1);
        assert!(Encoding::from_label("cp1252").is_err());
    }

    #[test]
    fn line_endings_normalize_to_lf() {
        let mut decoder = Decoder::new(Encoding::Utf8);
        assert_eq!(
            decoder.decode(b"a\r\nb\rc\nd\r\r\ne").unwrap(),
            "a\nb\nc\nd\n\ne"
        );
    }

    #[test]
    fn crlf_split_across_chunks() {
        let mut decoder = Decoder::new(Encoding::Utf8);
        let mut text = decoder.decode(b"1 example\r").unwrap();
        text += &decoder.decode(b"\n0 failures\r\n").unwrap();
        assert_eq!(text, "1 example\n0 failures\n");
    }

    #[test]
    fn multibyte_split_across_chunks() {
        let bytes = "✓ passed".as_bytes();
        let mut decoder = Decoder::new(Encoding::Utf8);
        let first = decoder.decode(&bytes[..2]).unwrap();
        let second = decoder.decode(&bytes[2..]).unwrap();
        assert_eq!(first, "");
        assert_eq!(second, "✓ passed");
        assert!(decoder.flush().is_none());
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut decoder = Decoder::new(Encoding::Utf8);
        let err = decoder.decode(b"ok \xff\xfe ok").unwrap_err();
        assert!(matches!(err, Error::Decode { ref encoding, .. } if encoding == "utf-8"));
        // the stream keeps going afterwards
        assert_eq!(decoder.decode(b"next\n").unwrap(), "next\n");
    }

    #[test]
    fn lossy_and_latin1_never_fail() {
        let mut lossy = Decoder::new(Encoding::Utf8Lossy);
        assert_eq!(lossy.decode(b"a\xffb").unwrap(), "a\u{fffd}b");

        let mut latin1 = Decoder::new(Encoding::Latin1);
        assert_eq!(latin1.decode(b"caf\xe9").unwrap(), "café");
    }

    #[test]
    fn truncated_tail_surfaces_on_flush() {
        let mut decoder = Decoder::new(Encoding::Utf8);
        assert_eq!(decoder.decode(b"end\xe2\x9c").unwrap(), "end");
        assert!(matches!(decoder.flush(), Some(Err(Error::Decode { .. }))));
    }
}
