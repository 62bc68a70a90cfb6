//! Graph Compactor
//!
//! Reachability-based garbage collection over the indirect-object graph.
//! Object streams are expanded first so nothing stays hidden inside a
//! compressed container, then everything unreachable from the catalog (or
//! the document information dictionary) is dropped.

use std::collections::{BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    error::{Result, StructureError},
    structure::object_stream,
    types::{Document, ObjectId, Value},
};

/// Default cap on the decoded size of a single container.
pub const DEFAULT_MAX_DECODED_BYTES: usize = 64 * 1024 * 1024;

/// Trailer entries whose references seed the reachability walk.
const ROOT_KEYS: [&[u8]; 2] = [b"Root", b"Info"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub containers_expanded: usize,
    pub objects_expanded: usize,
    pub objects_removed: usize,
    /// Distinct referenced ids that had no object before compaction
    pub dangling_references: usize,
}

#[derive(Debug, Clone)]
pub struct GraphCompactor {
    max_decoded_bytes: usize,
}

impl Default for GraphCompactor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECODED_BYTES)
    }
}

impl GraphCompactor {
    pub fn new(max_decoded_bytes: usize) -> Self {
        Self { max_decoded_bytes }
    }

    /// Expands containers and drops every object unreachable from the
    /// catalog. The trailer's `/Info` dictionary is the one other root kept.
    ///
    /// The catalog is looked up after expansion, so it may itself be packed.
    #[instrument(skip_all, fields(objects = doc.objects.len()))]
    pub fn compact(&self, doc: &mut Document) -> Result<CompactionReport> {
        let expansion = object_stream::expand_all(doc, self.max_decoded_bytes);
        let xref_streams = drop_xref_streams(doc);
        if doc.catalog().is_none() {
            return Err(StructureError::MissingCatalog.into());
        }

        let (reachable, dangling) = self.mark(doc);
        let unreachable: Vec<ObjectId> = doc
            .objects
            .keys()
            .filter(|id| !reachable.contains(*id))
            .copied()
            .collect();
        for id in &unreachable {
            debug!(object = %id, "dropping unreachable object");
            doc.remove(*id);
        }
        drop_stale_trailer_entries(doc);

        let report = CompactionReport {
            containers_expanded: expansion.containers.len(),
            objects_expanded: expansion.expanded.len(),
            objects_removed: unreachable.len() + xref_streams,
            dangling_references: dangling.len(),
        };
        info!(
            containers = report.containers_expanded,
            expanded = report.objects_expanded,
            removed = report.objects_removed,
            dangling = report.dangling_references,
            "compaction finished"
        );
        Ok(report)
    }

    /// Breadth-first walk from the trailer roots.
    fn mark(&self, doc: &Document) -> (HashSet<ObjectId>, BTreeSet<ObjectId>) {
        let mut queue = VecDeque::new();
        for key in ROOT_KEYS {
            if let Some(root) = doc.trailer.get(key) {
                root.for_each_reference(&mut |id| queue.push_back(id));
            }
        }

        let mut reachable = HashSet::new();
        let mut dangling = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if reachable.contains(&id) || dangling.contains(&id) {
                continue;
            }
            match doc.objects.get(&id) {
                Some(value) => {
                    reachable.insert(id);
                    value.for_each_reference(&mut |next| {
                        if !reachable.contains(&next) {
                            queue.push_back(next);
                        }
                    });
                }
                None => {
                    dangling.insert(id);
                }
            }
        }
        (reachable, dangling)
    }
}

/// Removes trailer entries outside the roots that now point at nothing.
fn drop_stale_trailer_entries(doc: &mut Document) {
    let stale: Vec<Vec<u8>> = doc
        .trailer
        .iter()
        .filter(|(key, value)| {
            !ROOT_KEYS.contains(&key.as_slice())
                && matches!(value, Value::Reference(id) if !doc.contains(*id))
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        doc.trailer.remove(&key);
    }
}

/// Removes cross-reference streams; the writer regenerates cross-reference data.
fn drop_xref_streams(doc: &mut Document) -> usize {
    let ids: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter(|(_, value)| matches!(value, Value::Stream(s) if s.dict.has_type(b"XRef")))
        .map(|(id, _)| *id)
        .collect();
    for id in &ids {
        doc.remove(*id);
    }
    ids.len()
}

/// True when every reference in `doc` resolves to a present object, except
/// for ids listed in `allowed_dangling`.
pub fn references_resolve(doc: &Document, allowed_dangling: &HashSet<ObjectId>) -> bool {
    let mut ok = true;
    let mut check = |id: ObjectId| {
        if !doc.contains(id) && !allowed_dangling.contains(&id) {
            ok = false;
        }
    };
    doc.trailer.for_each_reference(&mut check);
    for value in doc.objects.values() {
        value.for_each_reference(&mut check);
    }
    ok
}
