//! Object-level scanning
//!
//! Runs the same patterns over values taken from the object model: strings,
//! names (rendered with their leading `/`, so dictionary keys such as `/JS`
//! match) and decoded stream content.

use tracing::{debug, instrument, trace};

use super::{content_scanner::Findings, Finding, ObfuscationScanner};
use crate::{
    structure::filters::decode_stream,
    types::{Document, ObjectId, Value},
};

impl ObfuscationScanner {
    /// Scans every indirect object of `doc`.
    #[instrument(skip_all, fields(objects = doc.objects.len()))]
    pub fn scan_document(&self, doc: &Document) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (id, value) in &doc.objects {
            self.scan_value(*id, value, &mut findings);
        }
        debug!(findings = findings.len(), "object scan finished");
        findings
    }

    fn scan_value(&self, id: ObjectId, value: &Value, findings: &mut Vec<Finding>) {
        match value {
            Value::String(bytes, _) => self.scan_leaf(id, bytes, findings),
            Value::Name(name) => self.scan_leaf(id, &slashed(name), findings),
            Value::Array(items) => {
                for item in items {
                    self.scan_value(id, item, findings);
                }
            }
            Value::Dictionary(dict) => {
                for (key, item) in dict.iter() {
                    self.scan_leaf(id, &slashed(key), findings);
                    self.scan_value(id, item, findings);
                }
            }
            Value::Stream(stream) => {
                for (key, item) in stream.dict.iter() {
                    self.scan_leaf(id, &slashed(key), findings);
                    self.scan_value(id, item, findings);
                }
                match decode_stream(stream, self.max_decoded_bytes) {
                    Ok(content) => self.scan_leaf(id, &content, findings),
                    Err(e) => {
                        trace!(object = %id, error = %e, "scanning raw stream content");
                        self.scan_leaf(id, &stream.content, findings);
                    }
                }
            }
            Value::Null
            | Value::Boolean(_)
            | Value::Integer(_)
            | Value::Real(_)
            | Value::Reference(_) => {}
        }
    }

    fn scan_leaf(&self, id: ObjectId, bytes: &[u8], findings: &mut Vec<Finding>) {
        findings.extend(Findings::new(self, bytes, Some(id)));
    }
}

fn slashed(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(b'/');
    out.extend_from_slice(name);
    out
}
