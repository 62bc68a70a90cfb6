//! In-memory indirect-object arena for one pipeline run

use std::collections::{BTreeMap, HashSet};

use super::object::{Dictionary, ObjectId, Value};

/// Returned for references that do not resolve to any object.
static NULL_VALUE: Value = Value::Null;

/// Upper bound on reference-to-reference hops followed by `resolve`.
const MAX_RESOLVE_DEPTH: usize = 32;

/// A parsed document: indirect objects indexed by id plus the trailer
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub version: String,
    pub objects: BTreeMap<ObjectId, Value>,
    pub trailer: Dictionary,
}

impl Default for Document {
    fn default() -> Self {
        Self::new("1.7")
    }
}

impl Document {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            objects: BTreeMap::new(),
            trailer: Dictionary::new(),
        }
    }

    /// Looks up an object; dangling ids yield `Value::Null`.
    pub fn get(&self, id: ObjectId) -> &Value {
        self.objects.get(&id).unwrap_or(&NULL_VALUE)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Value> {
        self.objects.get_mut(&id)
    }

    pub fn set(&mut self, id: ObjectId, value: Value) {
        self.objects.insert(id, value);
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Value> {
        self.objects.remove(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Follows references until a direct value is reached.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        let mut current = value;
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Value::Reference(id) => current = self.get(*id),
                _ => return current,
            }
        }
        &NULL_VALUE
    }

    /// Adds an object under the next free number and returns its id.
    pub fn add_object<V: Into<Value>>(&mut self, value: V) -> ObjectId {
        let id = ObjectId::new(self.max_id() + 1, 0);
        self.objects.insert(id, value.into());
        id
    }

    pub fn max_id(&self) -> u32 {
        self.objects.keys().map(|id| id.number).max().unwrap_or(0)
    }

    pub fn catalog_id(&self) -> Option<ObjectId> {
        self.trailer.get(b"Root").and_then(Value::as_reference)
    }

    pub fn catalog(&self) -> Option<&Dictionary> {
        self.catalog_id().and_then(|id| self.get(id).as_dict())
    }

    pub fn catalog_mut(&mut self) -> Option<&mut Dictionary> {
        let id = self.catalog_id()?;
        self.get_mut(id).and_then(Value::as_dict_mut)
    }

    /// Leaf page ids in document order, walking the page tree from the catalog.
    ///
    /// Nodes with `/Kids` are interior nodes. Revisited nodes are skipped so a
    /// cyclic tree terminates.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        let mut pages = Vec::new();
        let Some(root) = self
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Value::as_reference)
        else {
            return pages;
        };

        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.get(id).as_dict() else {
                continue;
            };
            match node.get(b"Kids").map(|kids| self.resolve(kids)) {
                Some(Value::Array(kids)) => {
                    // Reverse so the first kid is visited first.
                    stack.extend(kids.iter().rev().filter_map(Value::as_reference));
                }
                _ if node.has_type(b"Pages") => {}
                _ => pages.push(id),
            }
        }
        pages
    }
}
