//! Read engine
//!
//! Reassembles a query result from normalized nodes. The walk follows the
//! query shape: entity references are resolved by id, parameterized fields
//! are spliced in from their own nodes, and aliased fields are renamed. Stored
//! containers that need none of this are returned as-is, so unchanged parts of
//! a result stay identical across reads and snapshot versions.
//!
//! Completeness is determined in the same pass: a result is complete when
//! every selected field is present. The walk never stops early, so node ids
//! are collected for the whole reachable overlap of shape and data.

use std::collections::{HashMap, HashSet};

use crate::graph::{node_id_for_parameterized_value, GraphSnapshot, GraphStore, NodeId, NodeSnapshot};
use crate::query::{ExpandedFieldMap, FieldMapEntry, ParsedQuery, Shape};
use crate::value::{JsonObject, JsonValue, PathPart};

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    /// `None` when the root node does not exist
    pub result: Option<JsonValue>,
    pub complete: bool,
    /// Every node visited, when requested
    pub node_ids: Option<HashSet<NodeId>>,
}

/// Read `query` from `snapshot`.
///
/// Results are memoized on the snapshot by operation fingerprint.
///
/// The result is a superset of the selection: stored containers are returned
/// as they are, so fields cached by other queries appear alongside the
/// selected ones. An aliased field appears under its alias and also under its
/// stored field name. Entity references are only followed where selected.
pub fn read(query: &ParsedQuery, snapshot: &GraphSnapshot, include_node_ids: bool) -> QueryResult {
    let mut result = match snapshot.cached_read(query.fingerprint) {
        Some(cached) => {
            tracing::trace!("Read cache hit: {:032x}", query.fingerprint);
            cached
        }
        None => {
            let result = Reader::new(snapshot).run(query);
            snapshot.cache_read(query.fingerprint, &result);
            result
        }
    };

    if !include_node_ids {
        result.node_ids = None;
    }
    result
}

struct Reader<'a> {
    snapshot: &'a GraphSnapshot,
    node_ids: HashSet<NodeId>,
    complete: bool,
    /// Materialized nodes by id and shape address
    memo: HashMap<(NodeId, usize), Option<JsonValue>>,
}

impl<'a> Reader<'a> {
    fn new(snapshot: &'a GraphSnapshot) -> Self {
        Reader {
            snapshot,
            node_ids: HashSet::new(),
            complete: true,
            memo: HashMap::new(),
        }
    }

    fn run(mut self, query: &ParsedQuery) -> QueryResult {
        let result = self.materialize_node(&query.root_id, &query.shape, query.dynamic_fields.as_ref());
        if result.is_none() {
            self.complete = false;
        }
        QueryResult {
            result,
            complete: self.complete,
            node_ids: Some(self.node_ids),
        }
    }

    fn is_entity(&self, id: &str) -> bool {
        self.snapshot
            .get_node_snapshot(id)
            .map_or(false, |node| node.is_entity())
    }

    fn materialize_node(&mut self, id: &str, shape: &Shape, dynamic: Option<&ExpandedFieldMap>) -> Option<JsonValue> {
        let key = (id.to_string(), shape as *const Shape as usize);
        if let Some(value) = self.memo.get(&key) {
            return value.clone();
        }

        let snapshot = self.snapshot;
        let Some(node) = snapshot.get_node_snapshot(id) else {
            self.complete = false;
            return None;
        };
        self.node_ids.insert(id.to_string());

        let value = self.materialize_value(id, node, &mut Vec::new(), node.data.as_ref(), shape, dynamic);
        self.memo.insert(key, value.clone());
        value
    }

    /// Materialize the value stored at `path` inside `node`
    fn materialize_value(
        &mut self,
        node_id: &str,
        node: &'a NodeSnapshot,
        path: &mut Vec<PathPart>,
        stored: Option<&'a JsonValue>,
        shape: &Shape,
        dynamic: Option<&ExpandedFieldMap>,
    ) -> Option<JsonValue> {
        if let Some(target) = node.entity_reference_at(path, |id| self.is_entity(id)) {
            if target != node_id || !path.is_empty() {
                return self.materialize_node(target, shape, dynamic);
            }
        }

        match stored? {
            JsonValue::Array(items) => {
                let mut changed = false;
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(PathPart::Index(index));
                    let value = self
                        .materialize_value(node_id, node, path, Some(item), shape, dynamic)
                        .unwrap_or(JsonValue::Null);
                    path.pop();
                    changed |= !value.ptr_eq(item);
                    out.push(value);
                }
                if changed {
                    Some(JsonValue::array(out))
                } else {
                    stored.cloned()
                }
            }
            JsonValue::Object(map) => Some(self.materialize_object(node_id, node, path, map, stored, shape, dynamic)),
            other => Some(other.clone()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn materialize_object(
        &mut self,
        node_id: &str,
        node: &'a NodeSnapshot,
        path: &mut Vec<PathPart>,
        map: &'a JsonObject,
        stored: Option<&'a JsonValue>,
        shape: &Shape,
        dynamic: Option<&ExpandedFieldMap>,
    ) -> JsonValue {
        let mut out: Option<JsonObject> = None;

        for field in &shape.fields {
            let entry = dynamic.and_then(|map| map.get(&field.response_key));
            let children = entry.and_then(FieldMapEntry::children);
            let stored_field = map.get(&field.name);

            let value = match entry.and_then(FieldMapEntry::args) {
                Some(args) => {
                    let mut field_path = path.clone();
                    field_path.push(PathPart::Key(field.name.clone()));
                    let param_id = node_id_for_parameterized_value(node_id, &field_path, args);
                    self.materialize_parameterized(&param_id, field.children.as_ref(), children)
                }
                None => {
                    path.push(PathPart::Key(field.name.clone()));
                    let value = match field.children {
                        Some(ref child_shape) => {
                            self.materialize_value(node_id, node, path, stored_field, child_shape, children)
                        }
                        None => stored_field.cloned(),
                    };
                    path.pop();
                    value
                }
            };

            let Some(value) = value else {
                self.complete = false;
                continue;
            };
            let shared = field.response_key == field.name
                && entry.and_then(FieldMapEntry::args).is_none()
                && stored_field.map_or(false, |s| s.ptr_eq(&value));
            if !shared {
                out.get_or_insert_with(|| map.clone())
                    .insert(field.response_key.clone(), value);
            }
        }

        match out {
            Some(map) => JsonValue::object(map),
            None => stored.cloned().unwrap_or_else(|| JsonValue::object(map.clone())),
        }
    }

    fn materialize_parameterized(
        &mut self,
        param_id: &str,
        shape: Option<&Shape>,
        dynamic: Option<&ExpandedFieldMap>,
    ) -> Option<JsonValue> {
        let snapshot = self.snapshot;
        let node = snapshot.get_node_snapshot(param_id)?;
        self.node_ids.insert(param_id.to_string());
        match shape {
            Some(shape) => self.materialize_value(param_id, node, &mut Vec::new(), node.data.as_ref(), shape, dynamic),
            None => node.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CacheContext, RawOperation};
    use crate::editor::merge;
    use serde_json::json;

    fn write(context: &CacheContext, snapshot: &GraphSnapshot, document: &str, payload: serde_json::Value) -> GraphSnapshot {
        let query = context.parse_operation(&RawOperation::query(document)).unwrap();
        merge(context, snapshot, &query, &JsonValue::from(payload)).unwrap().snapshot
    }

    fn read_doc(context: &CacheContext, snapshot: &GraphSnapshot, document: &str) -> QueryResult {
        let query = context.parse_operation(&RawOperation::query(document)).unwrap();
        read(&query, snapshot, true)
    }

    #[test]
    fn test_read_empty_snapshot() {
        let context = CacheContext::default();
        let result = read_doc(&context, &GraphSnapshot::new(), "{ viewer { id } }");
        assert_eq!(result.result, None);
        assert!(!result.complete);
    }

    #[test]
    fn test_read_back_entity() {
        let context = CacheContext::default();
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            "{ viewer { id name } }",
            json!({"viewer": {"id": 123, "name": "Gouda"}}),
        );

        let result = read_doc(&context, &snapshot, "{ viewer { id name } }");
        assert!(result.complete);
        assert_eq!(
            result.result,
            Some(JsonValue::from(json!({"viewer": {"id": 123, "name": "Gouda"}})))
        );
        let ids = result.node_ids.unwrap();
        assert!(ids.contains("ROOT_QUERY"));
        assert!(ids.contains("123"));
    }

    #[test]
    fn test_missing_field_is_incomplete() {
        let context = CacheContext::default();
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            "{ viewer { id } }",
            json!({"viewer": {"id": 1}}),
        );

        let result = read_doc(&context, &snapshot, "{ viewer { id name } }");
        assert!(!result.complete);
        assert_eq!(result.result, Some(JsonValue::from(json!({"viewer": {"id": 1}}))));
    }

    #[test]
    fn test_null_is_complete() {
        let context = CacheContext::default();
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            "{ viewer { id } }",
            json!({"viewer": null}),
        );
        let result = read_doc(&context, &snapshot, "{ viewer { id } }");
        assert!(result.complete);
        assert_eq!(result.result, Some(JsonValue::from(json!({"viewer": null}))));
    }

    #[test]
    fn test_alias_read() {
        let context = CacheContext::default();
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            "{ viewer { id name } }",
            json!({"viewer": {"id": 1, "name": "Ada"}}),
        );
        let result = read_doc(&context, &snapshot, "{ me: viewer { id fullName: name } }");
        assert!(result.complete);
        assert_eq!(
            result.result,
            Some(JsonValue::from(json!({"me": {"id": 1, "name": "Ada", "fullName": "Ada"}})))
        );
    }

    #[test]
    fn test_unselected_stored_fields_are_returned() {
        let context = CacheContext::default();
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            "{ viewer { id name best { id } avatar(size: 8) } }",
            json!({"viewer": {"id": 1, "name": "Ada", "best": {"id": 2}, "avatar": "a.png"}}),
        );
        let result = read_doc(&context, &snapshot, "{ viewer { name } }");
        assert!(result.complete);
        assert_eq!(
            result.result,
            Some(JsonValue::from(json!({"viewer": {"id": 1, "name": "Ada"}})))
        );
    }

    #[test]
    fn test_parameterized_overlay() {
        let context = CacheContext::default();
        let doc = r#"{ viewer { id avatar(size: 64) } }"#;
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            doc,
            json!({"viewer": {"id": 1, "avatar": "a64.png"}}),
        );

        let result = read_doc(&context, &snapshot, doc);
        assert!(result.complete);
        assert_eq!(
            result.result,
            Some(JsonValue::from(json!({"viewer": {"id": 1, "avatar": "a64.png"}})))
        );
        // Stored entity data does not carry the parameterized field
        assert_eq!(snapshot.get("1"), Some(&JsonValue::from(json!({"id": 1}))));

        let other = read_doc(&context, &snapshot, r#"{ viewer { id avatar(size: 128) } }"#);
        assert!(!other.complete);
    }

    #[test]
    fn test_read_is_memoized() {
        let context = CacheContext::default();
        let doc = "{ viewer { id friends { id } } }";
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            doc,
            json!({"viewer": {"id": 1, "friends": [{"id": 2}, {"id": 3}]}}),
        );

        let first = read_doc(&context, &snapshot, doc);
        let second = read_doc(&context, &snapshot, doc);
        assert!(first.result.unwrap().ptr_eq(&second.result.unwrap()));
    }

    #[test]
    fn test_unchanged_subtree_shares_storage() {
        let context = CacheContext::default();
        let snapshot = write(
            &context,
            &GraphSnapshot::new(),
            "{ viewer { id settings { theme } } }",
            json!({"viewer": {"id": 1, "settings": {"theme": "dark"}}}),
        );

        let result = read_doc(&context, &snapshot, "{ viewer { id settings { theme } } }");
        let viewer = result.result.as_ref().and_then(|r| r.get("viewer")).unwrap();
        let stored = snapshot.get("1").unwrap();
        assert!(viewer.ptr_eq(stored));
    }

    #[test]
    fn test_node_ids_omitted_unless_requested() {
        let context = CacheContext::default();
        let snapshot = write(&context, &GraphSnapshot::new(), "{ a }", json!({"a": 1}));
        let query = context.parse_operation(&RawOperation::query("{ a }")).unwrap();
        assert_eq!(read(&query, &snapshot, false).node_ids, None);
        assert!(read(&query, &snapshot, true).node_ids.is_some());
    }
}
