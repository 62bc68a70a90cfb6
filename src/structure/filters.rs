//! Stream filter decoding

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{Result, StructureError};
use crate::types::Stream;

/// Decodes stream content through its filter chain.
///
/// Supports `FlateDecode` (without predictors) and `ASCIIHexDecode`; any other
/// filter is reported as unsupported. Inflating past `max_out` bytes is an
/// error, never a silent truncation.
pub fn decode_stream(stream: &Stream, max_out: usize) -> Result<Vec<u8>> {
    let mut data = stream.content.clone();
    for filter in stream.filters() {
        data = match filter.as_slice() {
            b"FlateDecode" | b"Fl" => inflate(&data, max_out)?,
            b"ASCIIHexDecode" | b"AHx" => ascii_hex(&data)?,
            other => {
                return Err(StructureError::UnsupportedFilter(
                    String::from_utf8_lossy(other).into_owned(),
                )
                .into())
            }
        };
    }
    Ok(data)
}

/// Inflates zlib-wrapped data, failing on corrupt input or when the output
/// would exceed `max_out` bytes.
pub fn inflate(data: &[u8], max_out: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take((max_out as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| StructureError::Corrupted(format!("inflate failed: {e}")))?;
    if out.len() > max_out {
        return Err(StructureError::DecodedTooLarge(max_out).into());
    }
    Ok(out)
}

fn ascii_hex(data: &[u8]) -> Result<Vec<u8>> {
    let mut digits: Vec<u8> = data
        .iter()
        .copied()
        .take_while(|b| *b != b'>')
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    hex::decode(&digits)
        .map_err(|e| StructureError::Corrupted(format!("ASCIIHex decode failed: {e}")).into())
}
