//! Persistent JSON values
//!
//! Containers are reference counted so unchanged subtrees are shared between
//! snapshot versions. Two values are the *same* value (the `===` of the cache)
//! when [`JsonValue::ptr_eq`] holds; `==` compares by value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Object map. Keys are kept sorted, which also gives argument objects a
/// canonical serialization.
pub type JsonObject = BTreeMap<String, JsonValue>;

#[derive(Clone, Debug, PartialEq, Default)]
pub enum JsonValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Arc<Vec<JsonValue>>),
    Object(Arc<JsonObject>),
}

/// One step of a path into node data: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathPart {
    Index(usize),
    Key(String),
}

impl PathPart {
    pub fn key(&self) -> Option<&str> {
        match self {
            PathPart::Key(key) => Some(key),
            PathPart::Index(_) => None,
        }
    }
}

impl fmt::Display for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPart::Index(index) => write!(f, "{}", index),
            PathPart::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathPart {
    fn from(key: &str) -> Self {
        PathPart::Key(key.to_string())
    }
}

impl From<usize> for PathPart {
    fn from(index: usize) -> Self {
        PathPart::Index(index)
    }
}

/// Render a path for diagnostics: `viewer.friends.0.name`
pub fn render_path(path: &[PathPart]) -> String {
    path.iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Whether `path` starts with `prefix`
pub fn path_starts_with(path: &[PathPart], prefix: &[PathPart]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

impl JsonValue {
    pub fn object(map: JsonObject) -> Self {
        JsonValue::Object(Arc::new(map))
    }

    pub fn array(items: Vec<JsonValue>) -> Self {
        JsonValue::Array(Arc::new(items))
    }

    pub fn empty_object() -> Self {
        JsonValue::object(JsonObject::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsonValue::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, JsonValue::Array(_))
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Object field lookup; `None` for non-objects
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Identity comparison: shared containers, or equal scalars.
    pub fn ptr_eq(&self, other: &JsonValue) -> bool {
        match (self, other) {
            (JsonValue::Array(a), JsonValue::Array(b)) => Arc::ptr_eq(a, b),
            (JsonValue::Object(a), JsonValue::Object(b)) => Arc::ptr_eq(a, b),
            (JsonValue::Array(_), _) | (JsonValue::Object(_), _) => false,
            (_, JsonValue::Array(_)) | (_, JsonValue::Object(_)) => false,
            (a, b) => a == b,
        }
    }

    pub fn get_path(&self, path: &[PathPart]) -> Option<&JsonValue> {
        let mut current = self;
        for part in path {
            current = match (current, part) {
                (JsonValue::Object(map), PathPart::Key(key)) => map.get(key)?,
                (JsonValue::Array(items), PathPart::Index(index)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable lookup that clones every shared container on the way down.
    ///
    /// Containers already uniquely owned (cloned earlier in the same edit) are
    /// reused in place.
    pub(crate) fn get_path_mut(&mut self, path: &[PathPart]) -> Option<&mut JsonValue> {
        let mut current = self;
        for part in path {
            current = match (current, part) {
                (JsonValue::Object(map), PathPart::Key(key)) => Arc::make_mut(map).get_mut(key)?,
                (JsonValue::Array(items), PathPart::Index(index)) => {
                    Arc::make_mut(items).get_mut(*index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Store `value` at `path`. Returns false when the parent container is
    /// missing or of the wrong kind.
    pub(crate) fn set_path(&mut self, path: &[PathPart], value: JsonValue) -> bool {
        let Some((last, parent_path)) = path.split_last() else {
            *self = value;
            return true;
        };
        match (self.get_path_mut(parent_path), last) {
            (Some(JsonValue::Object(map)), PathPart::Key(key)) => {
                Arc::make_mut(map).insert(key.clone(), value);
                true
            }
            (Some(JsonValue::Array(items)), PathPart::Index(index)) => {
                let items = Arc::make_mut(items);
                if *index >= items.len() {
                    items.resize(index + 1, JsonValue::Null);
                }
                items[*index] = value;
                true
            }
            _ => false,
        }
    }

    /// Drop the value at `path`: object keys are removed, array slots become
    /// `null`. Returns whether anything was present.
    pub(crate) fn remove_path(&mut self, path: &[PathPart]) -> bool {
        let Some((last, parent_path)) = path.split_last() else {
            return false;
        };
        if self.get_path(path).is_none() {
            return false;
        }
        match (self.get_path_mut(parent_path), last) {
            (Some(JsonValue::Object(map)), PathPart::Key(key)) => {
                Arc::make_mut(map).remove(key).is_some()
            }
            (Some(JsonValue::Array(items)), PathPart::Index(index)) => {
                let items = Arc::make_mut(items);
                match items.get_mut(*index) {
                    Some(slot) if !slot.is_null() => {
                        *slot = JsonValue::Null;
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Set the length of the array at `path`, padding with `null`. Untouched
    /// when the length already matches; false when no array is there.
    pub(crate) fn resize_array(&mut self, path: &[PathPart], len: usize) -> bool {
        match self.get_path(path) {
            Some(JsonValue::Array(items)) if items.len() == len => return true,
            Some(JsonValue::Array(_)) => {}
            _ => return false,
        }
        match self.get_path_mut(path) {
            Some(JsonValue::Array(items)) => {
                Arc::make_mut(items).resize(len, JsonValue::Null);
                true
            }
            _ => false,
        }
    }

    /// Shallow copy of the top-level container, giving the value a new
    /// identity while sharing every child.
    pub(crate) fn reissue(&self) -> JsonValue {
        match self {
            JsonValue::Object(map) => JsonValue::object(JsonObject::clone(map)),
            JsonValue::Array(items) => JsonValue::array(Vec::clone(items)),
            other => other.clone(),
        }
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => JsonValue::Null,
            serde_json::Value::Bool(b) => JsonValue::Bool(b),
            serde_json::Value::Number(n) => JsonValue::Number(n),
            serde_json::Value::String(s) => JsonValue::String(s),
            serde_json::Value::Array(items) => {
                JsonValue::array(items.into_iter().map(JsonValue::from).collect())
            }
            serde_json::Value::Object(map) => JsonValue::object(
                map.into_iter()
                    .map(|(key, value)| (key, JsonValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&JsonValue> for serde_json::Value {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => serde_json::Value::Null,
            JsonValue::Bool(b) => serde_json::Value::Bool(*b),
            JsonValue::Number(n) => serde_json::Value::Number(n.clone()),
            JsonValue::String(s) => serde_json::Value::String(s.clone()),
            JsonValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            JsonValue::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for JsonValue {
    fn from(s: &str) -> Self {
        JsonValue::String(s.to_string())
    }
}

impl From<bool> for JsonValue {
    fn from(b: bool) -> Self {
        JsonValue::Bool(b)
    }
}

impl From<i64> for JsonValue {
    fn from(n: i64) -> Self {
        JsonValue::Number(n.into())
    }
}

impl From<i32> for JsonValue {
    fn from(n: i32) -> Self {
        JsonValue::Number(n.into())
    }
}

impl Serialize for JsonValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            JsonValue::Null => serializer.serialize_unit(),
            JsonValue::Bool(b) => serializer.serialize_bool(*b),
            JsonValue::Number(n) => n.serialize(serializer),
            JsonValue::String(s) => serializer.serialize_str(s),
            JsonValue::Array(items) => items.as_slice().serialize(serializer),
            JsonValue::Object(map) => JsonObject::serialize(map, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for JsonValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(JsonValue::from)
    }
}
