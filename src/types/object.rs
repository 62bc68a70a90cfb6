//! Typed PDF values held by the object arena

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of an indirect object: (number, generation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((number, generation): (u32, u16)) -> Self {
        Self { number, generation }
    }
}

impl From<ObjectId> for (u32, u16) {
    fn from(id: ObjectId) -> Self {
        (id.number, id.generation)
    }
}

/// How a string was written in the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringFormat {
    #[default]
    Literal,
    Hexadecimal,
}

/// A PDF value. References are plain ids resolved through the owning `Document`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Vec<u8>, StringFormat),
    Name(Vec<u8>),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

impl Value {
    pub fn name(name: &str) -> Self {
        Value::Name(name.as_bytes().to_vec())
    }

    pub fn string_literal(text: &str) -> Self {
        Value::String(text.as_bytes().to_vec(), StringFormat::Literal)
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            Value::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            Value::Stream(stream) => Some(&mut stream.dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match self {
            Value::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Calls `visit` for every reference nested anywhere inside this value.
    pub fn for_each_reference<F: FnMut(ObjectId)>(&self, visit: &mut F) {
        match self {
            Value::Reference(id) => visit(*id),
            Value::Array(items) => {
                for item in items {
                    item.for_each_reference(visit);
                }
            }
            Value::Dictionary(dict) => dict.for_each_reference(visit),
            Value::Stream(stream) => stream.dict.for_each_reference(visit),
            _ => {}
        }
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Reference(id)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Dictionary> for Value {
    fn from(dict: Dictionary) -> Self {
        Value::Dictionary(dict)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Ordered key/value container. Keys are raw name bytes without the leading slash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<Vec<u8>, Value>);

impl Dictionary {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn set<K: Into<Vec<u8>>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    /// Removes `key` keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Removes `key` and reports whether it was present.
    pub fn remove_key(&mut self, key: &[u8]) -> bool {
        self.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Value)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Vec<u8>, &mut Value)> {
        self.0.iter_mut()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    /// True when `/Type` is the given name.
    pub fn has_type(&self, type_name: &[u8]) -> bool {
        self.get(b"Type").and_then(Value::as_name) == Some(type_name)
    }

    pub fn for_each_reference<F: FnMut(ObjectId)>(&self, visit: &mut F) {
        for value in self.0.values() {
            value.for_each_reference(visit);
        }
    }
}

impl<K: Into<Vec<u8>>> FromIterator<(K, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A stream: dictionary plus raw (still encoded) content bytes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    pub dict: Dictionary,
    pub content: Vec<u8>,
}

impl Stream {
    pub fn new(mut dict: Dictionary, content: Vec<u8>) -> Self {
        dict.set("Length", content.len() as i64);
        Self { dict, content }
    }

    /// Filter names in application order.
    pub fn filters(&self) -> Vec<Vec<u8>> {
        match self.dict.get(b"Filter") {
            Some(Value::Name(name)) => vec![name.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_name().map(<[u8]>::to_vec))
                .collect(),
            _ => Vec::new(),
        }
    }
}
