//! PDF Document abstraction
//!
//! The codec capability (`DocumentCodec`) turns raw bytes into the crate's
//! object arena and back. `LopdfCodec` is the production implementation.

use std::{collections::BTreeMap, fmt, path::Path};

use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    types::{Dictionary, Document, ObjectId, Stream, StringFormat, Value},
};

/// Magic bytes every accepted input must start with
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Trailer keys that only describe the source file's cross-reference layout.
const STALE_TRAILER_KEYS: [&[u8]; 8] = [
    b"Prev",
    b"XRefStm",
    b"Type",
    b"W",
    b"Index",
    b"Filter",
    b"DecodeParms",
    b"Length",
];

/// Parse/serialize capability for the underlying document format
pub trait DocumentCodec: Send + Sync + fmt::Debug {
    fn parse(&self, bytes: &[u8]) -> Result<Document>;
    fn serialize(&self, doc: &Document) -> Result<Vec<u8>>;
}

/// True when `bytes` carries the PDF signature.
pub fn has_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Rejects `bytes` read from `path` unless they carry the PDF signature.
pub fn check_signature(bytes: &[u8], path: &Path) -> Result<()> {
    if has_signature(bytes) {
        Ok(())
    } else {
        Err(Error::NotADocument(path.to_path_buf()))
    }
}

/// Codec backed by `lopdf`
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCodec;

impl DocumentCodec for LopdfCodec {
    #[instrument(skip_all, fields(len = bytes.len()))]
    fn parse(&self, bytes: &[u8]) -> Result<Document> {
        if !has_signature(bytes) {
            return Err(Error::ParseError("missing %PDF- header".into()));
        }
        let source =
            lopdf::Document::load_mem(bytes).map_err(|e| Error::ParseError(e.to_string()))?;

        let mut objects: BTreeMap<ObjectId, Value> = source
            .objects
            .iter()
            .map(|(id, object)| (ObjectId::from(*id), from_lopdf(object)))
            .collect();
        let mut trailer = dict_from_lopdf(&source.trailer);

        // lopdf decrypts documents with an empty user password while loading;
        // the arena holds plaintext, so the security handler has to go.
        if trailer.contains_key(b"Encrypt") {
            if source.encryption_state.is_none() {
                return Err(Error::ParseError("encrypted document requires a password".into()));
            }
            if let Some(Value::Reference(id)) = trailer.remove(b"Encrypt") {
                objects.remove(&id);
            }
            debug!("dropped security handler of decrypted document");
        }
        debug!(objects = objects.len(), version = %source.version, "parsed document");

        Ok(Document {
            version: source.version.clone(),
            objects,
            trailer,
        })
    }

    #[instrument(skip_all, fields(objects = doc.objects.len()))]
    fn serialize(&self, doc: &Document) -> Result<Vec<u8>> {
        if doc.catalog().is_none() {
            return Err(Error::SerializeError("trailer has no /Root catalog".into()));
        }

        let mut target = lopdf::Document::with_version(doc.version.clone());
        target.objects = doc
            .objects
            .iter()
            .map(|(id, value)| ((*id).into(), to_lopdf(value)))
            .collect();
        target.max_id = doc.max_id();

        let mut trailer = dict_to_lopdf(&doc.trailer);
        for key in STALE_TRAILER_KEYS {
            trailer.remove(key);
        }
        target.trailer = trailer;

        let mut out = Vec::new();
        target
            .save_to(&mut out)
            .map_err(|e| Error::SerializeError(e.to_string()))?;
        Ok(out)
    }
}

/// A document loaded from disk together with its source bytes
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub document: Document,
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    /// Reads and parses a document, validating existence and signature first.
    pub async fn load(path: &Path, codec: &dyn DocumentCodec) -> Result<Self> {
        let bytes = read_document_bytes(path).await?;
        let document = codec.parse(&bytes)?;
        Ok(Self { document, bytes })
    }
}

/// Reads a file that must exist and start with the PDF signature.
pub async fn read_document_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    check_signature(&bytes, path)?;
    Ok(bytes)
}

fn from_lopdf(object: &lopdf::Object) -> Value {
    use lopdf::Object;

    match object {
        Object::Null => Value::Null,
        Object::Boolean(b) => Value::Boolean(*b),
        Object::Integer(n) => Value::Integer(*n),
        Object::Real(r) => Value::Real(f64::from(*r)),
        Object::Name(name) => Value::Name(name.clone()),
        Object::String(bytes, format) => Value::String(
            bytes.clone(),
            match format {
                lopdf::StringFormat::Literal => StringFormat::Literal,
                lopdf::StringFormat::Hexadecimal => StringFormat::Hexadecimal,
            },
        ),
        Object::Array(items) => Value::Array(items.iter().map(from_lopdf).collect()),
        Object::Dictionary(dict) => Value::Dictionary(dict_from_lopdf(dict)),
        Object::Stream(stream) => Value::Stream(Stream {
            dict: dict_from_lopdf(&stream.dict),
            content: stream.content.clone(),
        }),
        Object::Reference(id) => Value::Reference((*id).into()),
    }
}

fn dict_from_lopdf(dict: &lopdf::Dictionary) -> Dictionary {
    dict.iter()
        .map(|(key, value)| (key.clone(), from_lopdf(value)))
        .collect()
}

fn to_lopdf(value: &Value) -> lopdf::Object {
    use lopdf::Object;

    match value {
        Value::Null => Object::Null,
        Value::Boolean(b) => Object::Boolean(*b),
        Value::Integer(n) => Object::Integer(*n),
        Value::Real(r) => Object::Real(*r as f32),
        Value::Name(name) => Object::Name(name.clone()),
        Value::String(bytes, format) => Object::String(
            bytes.clone(),
            match format {
                StringFormat::Literal => lopdf::StringFormat::Literal,
                StringFormat::Hexadecimal => lopdf::StringFormat::Hexadecimal,
            },
        ),
        Value::Array(items) => Object::Array(items.iter().map(to_lopdf).collect()),
        Value::Dictionary(dict) => Object::Dictionary(dict_to_lopdf(dict)),
        Value::Stream(stream) => Object::Stream(lopdf::Stream::new(
            dict_to_lopdf(&stream.dict),
            stream.content.clone(),
        )),
        Value::Reference(id) => Object::Reference((*id).into()),
    }
}

fn dict_to_lopdf(dict: &Dictionary) -> lopdf::Dictionary {
    let mut out = lopdf::Dictionary::new();
    for (key, value) in dict.iter() {
        out.set(key.clone(), to_lopdf(value));
    }
    out
}
