//! Residual risk assessment of a sanitized document
//!
//! Runs after the final scrub and reports anything that still looks like
//! active content. Purely advisory; it never mutates the document.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    cleaner::{Denylist, ObjectRole},
    structure::filters::decode_stream,
    types::{Document, ObjectId, Value},
};

/// Info keys inspected for script markers.
const INFO_KEYS: [&[u8]; 6] = [
    b"Creator",
    b"Producer",
    b"Author",
    b"Title",
    b"Subject",
    b"Keywords",
];

const STREAM_MARKERS: [&[u8]; 2] = [b"/JavaScript", b"/JS"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskFactor {
    /// A denylisted key survived on a page or the catalog
    DenylistedKey {
        role: ObjectRole,
        key: String,
        object: ObjectId,
    },
    /// A stream whose content names a script action
    ScriptStream { object: ObjectId },
    /// A document-information entry mentioning scripts
    SuspiciousMetadata { key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    /// One point per factor; zero means nothing suspicious remained.
    pub fn score(&self) -> usize {
        self.factors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.factors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RiskChecker {
    denylist: Denylist,
    max_decoded_bytes: usize,
}

impl RiskChecker {
    pub fn new(denylist: Denylist, max_decoded_bytes: usize) -> Self {
        Self {
            denylist,
            max_decoded_bytes,
        }
    }

    #[instrument(skip_all)]
    pub fn assess(&self, doc: &Document) -> RiskAssessment {
        let mut assessment = RiskAssessment::default();

        if let Some(catalog_id) = doc.catalog_id() {
            self.check_keys(doc, catalog_id, ObjectRole::Catalog, &mut assessment);
        }
        for page_id in doc.page_ids() {
            self.check_keys(doc, page_id, ObjectRole::Page, &mut assessment);
        }

        for (id, value) in &doc.objects {
            let Value::Stream(stream) = value else {
                continue;
            };
            let content = decode_stream(stream, self.max_decoded_bytes)
                .unwrap_or_else(|_| stream.content.clone());
            if STREAM_MARKERS.iter().any(|marker| contains(&content, marker)) {
                warn!(object = %id, "stream still names a script action");
                assessment.factors.push(RiskFactor::ScriptStream { object: *id });
            }
        }

        if let Some(info) = doc
            .trailer
            .get(b"Info")
            .map(|info| doc.resolve(info))
            .and_then(Value::as_dict)
        {
            for key in INFO_KEYS {
                let Some(Value::String(text, _)) = info.get(key).map(|v| doc.resolve(v)) else {
                    continue;
                };
                if contains(&text.to_ascii_lowercase(), b"script") {
                    assessment.factors.push(RiskFactor::SuspiciousMetadata {
                        key: String::from_utf8_lossy(key).into_owned(),
                    });
                }
            }
        }

        debug!(score = assessment.score(), "risk assessment finished");
        assessment
    }

    fn check_keys(
        &self,
        doc: &Document,
        object: ObjectId,
        role: ObjectRole,
        assessment: &mut RiskAssessment,
    ) {
        let Some(dict) = doc.get(object).as_dict() else {
            return;
        };
        for key in self.denylist.keys_for(role) {
            if dict.contains_key(key.as_bytes()) {
                assessment.factors.push(RiskFactor::DenylistedKey {
                    role,
                    key: key.to_string(),
                    object,
                });
            }
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
