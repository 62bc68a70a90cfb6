//! Attribute Scrubber
//!
//! Removes denylisted keys from pages, their annotations and the catalog.
//! Removal only ever deletes keys, so running the scrubber on its own output
//! finds nothing left to remove.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, instrument};

use super::denylist::{Denylist, ObjectRole};
use crate::types::{Dictionary, Document, ObjectId, Value};

/// A key that was actually removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removal {
    pub role: ObjectRole,
    pub key: String,
    /// Object holding the dictionary; for inline annotations this is the
    /// object that owns the `/Annots` array.
    pub object: ObjectId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrubReport {
    pub removals: Vec<Removal>,
}

impl ScrubReport {
    pub fn is_clean(&self) -> bool {
        self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }

    pub fn count(&self, role: ObjectRole) -> usize {
        self.removals.iter().filter(|r| r.role == role).count()
    }

    pub fn merge(&mut self, other: ScrubReport) {
        self.removals.extend(other.removals);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scrubber {
    denylist: Denylist,
}

impl Scrubber {
    pub fn new(denylist: Denylist) -> Self {
        Self { denylist }
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Strips every denylisted key from `doc` in place.
    ///
    /// Pages are visited in document order. A page's annotations are scrubbed
    /// before the page itself, so annotation rules still apply when the page
    /// rules drop `/Annots`. The catalog is scrubbed last.
    #[instrument(skip_all, fields(denylist = %self.denylist.name))]
    pub fn scrub(&self, doc: &mut Document) -> ScrubReport {
        let mut report = ScrubReport::default();
        let mut seen_annotations = HashSet::new();

        for page_id in doc.page_ids() {
            self.scrub_annotations(doc, page_id, &mut seen_annotations, &mut report);
            if let Some(page) = doc.get_mut(page_id).and_then(Value::as_dict_mut) {
                strip(&self.denylist, page, ObjectRole::Page, page_id, &mut report);
            }
        }

        if let Some(catalog_id) = doc.catalog_id() {
            if let Some(catalog) = doc.get_mut(catalog_id).and_then(Value::as_dict_mut) {
                strip(
                    &self.denylist,
                    catalog,
                    ObjectRole::Catalog,
                    catalog_id,
                    &mut report,
                );
            }
        }

        debug!(removed = report.len(), "scrub pass finished");
        report
    }

    fn scrub_annotations(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        seen: &mut HashSet<ObjectId>,
        report: &mut ScrubReport,
    ) {
        let Some(annots) = doc
            .get(page_id)
            .as_dict()
            .and_then(|page| page.get(b"Annots"))
        else {
            return;
        };

        // Owner of the array: the page for an inline array, otherwise the array object.
        let (owner, items) = match annots {
            Value::Reference(id) => (*id, doc.get(*id).clone()),
            inline => (page_id, inline.clone()),
        };
        let Some(items) = items.as_array() else {
            return;
        };

        for (index, item) in items.iter().enumerate() {
            match item {
                Value::Reference(id) => {
                    if !seen.insert(*id) {
                        continue;
                    }
                    if let Some(annotation) = doc.get_mut(*id).and_then(Value::as_dict_mut) {
                        strip(&self.denylist, annotation, ObjectRole::Annotation, *id, report);
                    }
                }
                Value::Dictionary(_) => {
                    if let Some(annotation) = inline_annotation(doc, owner, page_id, index) {
                        strip(&self.denylist, annotation, ObjectRole::Annotation, owner, report);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Finds the inline annotation dictionary at `index` of the array owned by `owner`.
fn inline_annotation(
    doc: &mut Document,
    owner: ObjectId,
    page_id: ObjectId,
    index: usize,
) -> Option<&mut Dictionary> {
    let array = if owner == page_id {
        doc.get_mut(page_id)?.as_dict_mut()?.get_mut(b"Annots")?
    } else {
        doc.get_mut(owner)?
    };
    match array {
        Value::Array(items) => items.get_mut(index)?.as_dict_mut(),
        _ => None,
    }
}

fn strip(
    denylist: &Denylist,
    dict: &mut Dictionary,
    role: ObjectRole,
    object: ObjectId,
    report: &mut ScrubReport,
) {
    for key in denylist.keys_for(role) {
        if dict.remove_key(key.as_bytes()) {
            debug!(%role, key, %object, "removed denylisted key");
            report.removals.push(Removal {
                role,
                key: key.to_string(),
                object,
            });
        }
    }
}
