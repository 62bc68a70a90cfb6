//! Object stream expansion
//!
//! Moves every object packed inside a `/Type /ObjStm` container out into the
//! top-level object table so per-object inspection can see it.

use tracing::{debug, warn};

use super::{filters::decode_stream, parser::ObjectParser};
use crate::{
    error::{Result, StructureError},
    types::{Document, ObjectId, Stream, Value},
};

/// Upper bound on objects declared by one container header.
const MAX_OBJECTS_PER_CONTAINER: usize = 100_000;

/// Outcome of expanding the containers of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub containers: Vec<ObjectId>,
    pub expanded: Vec<ObjectId>,
}

/// Parses the objects packed inside one object stream.
pub fn unpack(stream: &Stream, max_decoded: usize) -> Result<Vec<(ObjectId, Value)>> {
    let count = header_usize(stream, b"N")?;
    let first = header_usize(stream, b"First")?;
    if count > MAX_OBJECTS_PER_CONTAINER {
        return Err(StructureError::InvalidObjectStream(format!("/N {count} too large")).into());
    }

    let data = decode_stream(stream, max_decoded)?;
    if first > data.len() {
        return Err(StructureError::InvalidObjectStream(format!(
            "/First {first} beyond decoded length {}",
            data.len()
        ))
        .into());
    }

    let mut header = ObjectParser::new(&data[..first]);
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let number = u32::try_from(header.parse_unsigned()?)
            .map_err(|_| StructureError::InvalidObjectStream("object number overflow".into()))?;
        let offset = usize::try_from(header.parse_unsigned()?)
            .map_err(|_| StructureError::InvalidObjectStream("offset overflow".into()))?;
        offsets.push((number, offset));
    }

    offsets
        .into_iter()
        .map(|(number, offset)| {
            let start = first
                .checked_add(offset)
                .filter(|start| *start < data.len())
                .ok_or_else(|| {
                    StructureError::InvalidObjectStream(format!(
                        "object {number} offset {offset} outside decoded data"
                    ))
                })?;
            let mut parser = ObjectParser::at(&data, start);
            Ok((ObjectId::new(number, 0), parser.parse_value()?))
        })
        .collect()
}

/// Expands every object stream in `doc` and removes the containers.
///
/// An object already present in the table wins over a packed copy with the
/// same number. Containers that cannot be decoded are still removed; their
/// contents are only reachable through cross-reference data the codec has
/// already resolved.
pub fn expand_all(doc: &mut Document, max_decoded: usize) -> Expansion {
    let containers: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter(|(_, value)| matches!(value, Value::Stream(s) if s.dict.has_type(b"ObjStm")))
        .map(|(id, _)| *id)
        .collect();

    let mut expansion = Expansion::default();
    for container_id in containers {
        let Some(Value::Stream(stream)) = doc.remove(container_id) else {
            continue;
        };
        match unpack(&stream, max_decoded) {
            Ok(objects) => {
                for (id, value) in objects {
                    if doc.contains(id) {
                        continue;
                    }
                    debug!(object = %id, container = %container_id, "expanded packed object");
                    doc.set(id, value);
                    expansion.expanded.push(id);
                }
            }
            Err(e) => warn!(container = %container_id, error = %e, "dropping undecodable object stream"),
        }
        expansion.containers.push(container_id);
    }
    expansion
}

fn header_usize(stream: &Stream, key: &[u8]) -> Result<usize> {
    stream
        .dict
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            StructureError::InvalidObjectStream(format!(
                "missing or invalid /{}",
                String::from_utf8_lossy(key)
            ))
            .into()
        })
}

/// Packs `objects` into a Flate-compressed object stream.
#[cfg(test)]
pub(crate) fn pack(objects: &[(u32, &[u8])]) -> Stream {
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    let mut header = Vec::new();
    let mut body = Vec::new();
    for (number, source) in objects {
        header.extend_from_slice(format!("{} {} ", number, body.len()).as_bytes());
        body.extend_from_slice(source);
        body.push(b'\n');
    }
    let first = header.len();
    header.extend_from_slice(&body);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&header).unwrap();
    let mut dict = crate::types::Dictionary::new();
    dict.set("Type", Value::name("ObjStm"));
    dict.set("N", objects.len() as i64);
    dict.set("First", first as i64);
    dict.set("Filter", Value::name("FlateDecode"));
    Stream::new(dict, encoder.finish().unwrap())
}
