//! Speculative decoders applied to match contexts

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::bytes::{Captures, Regex};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::structure::filters::inflate;

lazy_static! {
    static ref JS_ESCAPE: Regex = Regex::new(r"\\x([0-9a-fA-F]{2})|%u([0-9a-fA-F]{4})").unwrap();
}

/// Result of trying each decoder on a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Base64(Vec<u8>),
    Hex(Vec<u8>),
    Inflated(Vec<u8>),
    /// JavaScript `unescape`-style percent, `%u` and `\x` escapes resolved
    Unescaped(Vec<u8>),
    Undecodable,
}

impl Decoded {
    pub fn encoding(&self) -> &'static str {
        match self {
            Decoded::Base64(_) => "base64",
            Decoded::Hex(_) => "hex",
            Decoded::Inflated(_) => "inflate",
            Decoded::Unescaped(_) => "unescape",
            Decoded::Undecodable => "undecodable",
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Decoded::Base64(b) | Decoded::Hex(b) | Decoded::Inflated(b) | Decoded::Unescaped(b) => {
                Some(b.as_slice())
            }
            Decoded::Undecodable => None,
        }
    }

    pub fn is_decoded(&self) -> bool {
        !matches!(self, Decoded::Undecodable)
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes() {
            Some(bytes) => write!(f, "{}: {}", self.encoding(), String::from_utf8_lossy(bytes)),
            None => f.write_str(self.encoding()),
        }
    }
}

impl Serialize for Decoded {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Decoded", 2)?;
        state.serialize_field("encoding", self.encoding())?;
        state.serialize_field("text", &self.bytes().map(String::from_utf8_lossy))?;
        state.end()
    }
}

/// Tries base64, hex, zlib inflate and JavaScript unescaping in that order.
pub fn decode(data: &[u8], max_decoded: usize) -> Decoded {
    if let Some(bytes) = base64(data) {
        return Decoded::Base64(bytes);
    }
    if let Some(bytes) = hex_digits(data) {
        return Decoded::Hex(bytes);
    }
    if let Some(bytes) = inflated(data, max_decoded) {
        return Decoded::Inflated(bytes);
    }
    if let Some(bytes) = unescape(data) {
        return Decoded::Unescaped(bytes);
    }
    Decoded::Undecodable
}

fn base64(data: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return None;
    }
    STANDARD.decode(&compact).ok().filter(|out| !out.is_empty())
}

fn hex_digits(data: &[u8]) -> Option<Vec<u8>> {
    let digits: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace() && *b != b'<' && *b != b'>')
        .collect();
    if digits.is_empty() {
        return None;
    }
    hex::decode(&digits).ok()
}

fn inflated(data: &[u8], max_decoded: usize) -> Option<Vec<u8>> {
    if data.is_empty() {
        return None;
    }
    inflate(data, max_decoded).ok().filter(|out| !out.is_empty())
}

/// Resolves `%NN`, `%uNNNN` and `\xNN` escapes; `None` when nothing changed.
pub fn unescape(data: &[u8]) -> Option<Vec<u8>> {
    let normalized = JS_ESCAPE.replace_all(data, |caps: &Captures| -> Vec<u8> {
        if let Some(byte) = caps.get(1) {
            let mut out = b"%".to_vec();
            out.extend_from_slice(byte.as_bytes());
            return out;
        }
        let code = std::str::from_utf8(&caps[2])
            .ok()
            .and_then(|digits| u32::from_str_radix(digits, 16).ok())
            .and_then(char::from_u32);
        match code {
            Some(c) => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .flat_map(|b| format!("%{b:02X}").into_bytes())
                    .collect()
            }
            None => caps[0].to_vec(),
        }
    });
    let decoded = urlencoding::decode_binary(&normalized).into_owned();
    (decoded != data).then_some(decoded)
}
