//! Snapshot editor
//!
//! Computes a new immutable snapshot from a parent snapshot and a sequence of
//! payload writes. Nodes are copied lazily on first write; within a node only
//! the containers along an edited path are cloned, so every untouched subtree
//! stays shared with the parent snapshot.
//!
//! Commit runs in fixed order:
//! 1. Re-issue data of containers whose outbound references changed
//! 2. Collect orphans reachable from removed references
//! 3. Determine edited nodes (`get(id)` no longer identical to the parent, or
//!    a data-less parameterized node pointing at a different entity)
//! 4. Apply the entity transformer to edited entities
//! 5. Determine rebuilt nodes: everything reaching an edited node

mod gc;
mod references;

pub use references::{ReferenceEdit, ReferenceEditLog};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::context::CacheContext;
use crate::error::{GraphError, Result};
use crate::graph::traversal::bfs;
use crate::graph::{
    is_root_id, node_id_for_parameterized_value, GraphSnapshot, GraphStore, NodeId, NodeKind, NodeSnapshot,
};
use crate::query::{ExpandedFieldMap, FieldMapEntry, ParsedQuery, Shape};
use crate::value::{path_starts_with, render_path, JsonObject, JsonValue, PathPart};

/// Result of a committed edit
#[derive(Debug)]
pub struct EditedSnapshot {
    pub snapshot: GraphSnapshot,
    /// Nodes whose data differs by identity from the parent snapshot, or
    /// whose whole-value entity reference was repointed
    pub edited_node_ids: HashSet<NodeId>,
    /// Nodes that reach an edited node without being edited themselves
    pub rebuilt_node_ids: HashSet<NodeId>,
    pub warnings: Vec<String>,
}

/// Write `payload` for `query` on top of `parent`.
///
/// All-or-nothing: on error no snapshot is produced.
pub fn merge(
    context: &CacheContext,
    parent: &GraphSnapshot,
    query: &ParsedQuery,
    payload: &JsonValue,
) -> Result<EditedSnapshot> {
    let mut editor = SnapshotEditor::new(context, parent);
    editor.merge(query, payload)?;
    Ok(editor.commit())
}

/// Accumulates writes against a parent snapshot.
///
/// A failed [`SnapshotEditor::merge`] leaves the editor in an unspecified
/// state; discard it rather than committing.
pub struct SnapshotEditor<'a> {
    context: &'a CacheContext,
    parent: &'a GraphSnapshot,
    /// Nodes copied or created by this edit
    new_nodes: HashMap<NodeId, NodeSnapshot>,
    removed: HashSet<NodeId>,
    reference_edits: ReferenceEditLog,
    outbound_changed: HashSet<NodeId>,
    orphan_candidates: Vec<NodeId>,
    warnings: Vec<String>,
}

impl<'a> SnapshotEditor<'a> {
    pub fn new(context: &'a CacheContext, parent: &'a GraphSnapshot) -> Self {
        SnapshotEditor {
            context,
            parent,
            new_nodes: HashMap::new(),
            removed: HashSet::new(),
            reference_edits: ReferenceEditLog::new(),
            outbound_changed: HashSet::new(),
            orphan_candidates: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Merge one payload rooted at `query.root_id`
    pub fn merge(&mut self, query: &ParsedQuery, payload: &JsonValue) -> Result<()> {
        let root_id = query.root_id.as_str();
        let Some(fields) = payload.as_object() else {
            return Err(GraphError::invalid_payload(root_id, "payload must be an object"));
        };

        self.ensure_object_data(root_id);
        self.merge_fields(
            root_id,
            &mut Vec::new(),
            &query.shape,
            query.dynamic_fields.as_ref(),
            fields,
        )?;
        self.apply_reference_edits();
        Ok(())
    }

    /// Produce the new snapshot
    pub fn commit(mut self) -> EditedSnapshot {
        self.reissue_changed_containers();
        self.collect_orphans();

        let edited_node_ids = self.edited_node_ids();
        self.transform_edited_entities(&edited_node_ids);

        let mut values = self.parent.values().clone();
        for id in &self.removed {
            values.remove(id);
        }
        for (id, node) in self.new_nodes.drain() {
            if self.removed.contains(&id) {
                continue;
            }
            let unchanged = self.parent.get_shared(&id).map_or(false, |previous| {
                same_data(previous.data.as_ref(), node.data.as_ref())
                    && previous.inbound == node.inbound
                    && previous.outbound == node.outbound
            });
            if !unchanged {
                values.insert(id, Arc::new(node));
            }
        }
        let snapshot = GraphSnapshot::from_nodes(values);

        let rebuilt_node_ids = rebuilt_node_ids(&snapshot, &edited_node_ids);

        if self.context.config().verbose {
            tracing::info!(
                "Committed snapshot: {} nodes, {} edited, {} rebuilt, {} removed",
                snapshot.len(),
                edited_node_ids.len(),
                rebuilt_node_ids.len(),
                self.removed.len()
            );
        } else {
            tracing::debug!(
                "Committed snapshot: {} nodes, {} edited, {} rebuilt, {} removed",
                snapshot.len(),
                edited_node_ids.len(),
                rebuilt_node_ids.len(),
                self.removed.len()
            );
        }
        if self.context.config().freeze {
            snapshot.freeze();
        }

        EditedSnapshot {
            snapshot,
            edited_node_ids,
            rebuilt_node_ids,
            warnings: self.warnings,
        }
    }

    // ========================================================================
    // Working state
    // ========================================================================

    fn get_node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.new_nodes
            .get(id)
            .or_else(|| self.parent.get_node_snapshot(id))
    }

    /// Node copied into this edit, created with `kind` if it does not exist
    fn node_mut(&mut self, id: &str, kind: NodeKind) -> &mut NodeSnapshot {
        let parent = self.parent;
        self.new_nodes.entry(id.to_string()).or_insert_with(|| match parent.get_node_snapshot(id) {
            Some(node) => node.clone(),
            None => NodeSnapshot {
                kind,
                data: None,
                inbound: Vec::new(),
                outbound: Vec::new(),
            },
        })
    }

    fn is_entity(&self, id: &str) -> bool {
        self.get_node(id).map_or(false, |node| node.is_entity())
    }

    fn entity_reference_at(&self, container_id: &str, path: &[PathPart]) -> Option<NodeId> {
        self.get_node(container_id)?
            .entity_reference_at(path, |id| self.is_entity(id))
            .cloned()
    }

    fn data_at(&self, container_id: &str, path: &[PathPart]) -> Option<&JsonValue> {
        self.get_node(container_id)?.data.as_ref()?.get_path(path)
    }

    fn ensure_object_data(&mut self, id: &str) {
        let is_object = self
            .get_node(id)
            .and_then(|node| node.data.as_ref())
            .map_or(false, |data| data.is_object());
        if !is_object {
            self.node_mut(id, NodeKind::Entity).data = Some(JsonValue::empty_object());
        }
    }

    /// Store `value` unless an equal value is already there
    fn set_data(&mut self, container_id: &str, path: &[PathPart], value: JsonValue) -> Result<()> {
        if self.data_at(container_id, path) == Some(&value) {
            return Ok(());
        }
        let node = self.node_mut(container_id, NodeKind::Entity);
        if path.is_empty() {
            node.data = Some(value);
            return Ok(());
        }
        let stored = node.data.as_mut().map_or(false, |data| data.set_path(path, value));
        if stored {
            Ok(())
        } else {
            Err(GraphError::invalid_payload(
                location(container_id, path),
                "no container to store the value in",
            ))
        }
    }

    /// Drop an inline value. Array slots become `null`, so their index stays
    /// available for a reference.
    fn remove_data(&mut self, container_id: &str, path: &[PathPart]) {
        let present = match self.data_at(container_id, path) {
            None => false,
            Some(value) => !(value.is_null() && matches!(path.last(), Some(PathPart::Index(_)))),
        };
        if !present {
            return;
        }
        let node = self.node_mut(container_id, NodeKind::Entity);
        if path.is_empty() {
            node.data = None;
        } else if let Some(data) = node.data.as_mut() {
            data.remove_path(path);
        }
    }

    /// Queue removal of references under `path`: everything strictly below it,
    /// plus the entity reference at `path` itself when `inclusive`.
    /// Parameterized values at `path` belong to sibling invocations and stay.
    fn remove_references_under(&mut self, container_id: &str, path: &[PathPart], inclusive: bool) {
        let Some(node) = self.get_node(container_id) else {
            return;
        };
        let removals: Vec<(Vec<PathPart>, NodeId)> = node
            .outbound
            .iter()
            .filter_map(|reference| {
                let ref_path = reference.path.as_deref()?;
                if !path_starts_with(ref_path, path) {
                    return None;
                }
                let below = ref_path.len() > path.len();
                if below || (inclusive && self.is_entity(&reference.id)) {
                    Some((ref_path.to_vec(), reference.id.clone()))
                } else {
                    None
                }
            })
            .collect();

        for (path, id) in removals {
            self.reference_edits.push(ReferenceEdit::Remove {
                container_id: container_id.to_string(),
                path,
                id,
            });
        }
    }

    /// Queue removal of references into array elements at or past `len`
    fn remove_references_past(&mut self, container_id: &str, path: &[PathPart], len: usize) {
        let Some(node) = self.get_node(container_id) else {
            return;
        };
        let removals: Vec<(Vec<PathPart>, NodeId)> = node
            .outbound
            .iter()
            .filter_map(|reference| {
                let ref_path = reference.path.as_deref()?;
                if !path_starts_with(ref_path, path) {
                    return None;
                }
                match ref_path.get(path.len()) {
                    Some(PathPart::Index(index)) if *index >= len => Some((ref_path.to_vec(), reference.id.clone())),
                    _ => None,
                }
            })
            .collect();

        for (path, id) in removals {
            self.reference_edits.push(ReferenceEdit::Remove {
                container_id: container_id.to_string(),
                path,
                id,
            });
        }
    }

    // ========================================================================
    // Payload walk
    // ========================================================================

    fn merge_fields(
        &mut self,
        container_id: &str,
        path: &mut Vec<PathPart>,
        shape: &Shape,
        dynamic: Option<&ExpandedFieldMap>,
        payload: &JsonObject,
    ) -> Result<()> {
        for field in &shape.fields {
            let Some(value) = payload.get(&field.response_key) else {
                let message = format!(
                    "Missing field '{}' at {}",
                    field.response_key,
                    location(container_id, path)
                );
                if self.context.config().strict {
                    return Err(GraphError::invalid_payload(location(container_id, path), message));
                }
                self.context.warn(&message);
                self.warnings.push(message);
                continue;
            };

            let entry = dynamic.and_then(|map| map.get(&field.response_key));
            let children = entry.and_then(FieldMapEntry::children);

            match entry.and_then(FieldMapEntry::args) {
                Some(args) => {
                    let mut field_path = path.clone();
                    field_path.push(PathPart::Key(field.name.clone()));
                    let param_id = node_id_for_parameterized_value(container_id, &field_path, args);
                    self.ensure_parameterized_value(container_id, &field_path, &param_id);
                    self.merge_value(&param_id, &mut Vec::new(), field.children.as_ref(), children, value)?;
                }
                None => {
                    path.push(PathPart::Key(field.name.clone()));
                    self.merge_value(container_id, path, field.children.as_ref(), children, value)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }

    fn merge_value(
        &mut self,
        container_id: &str,
        path: &mut Vec<PathPart>,
        shape: Option<&Shape>,
        dynamic: Option<&ExpandedFieldMap>,
        value: &JsonValue,
    ) -> Result<()> {
        let Some(shape) = shape else {
            self.remove_references_under(container_id, path, true);
            return self.set_data(container_id, path, value.clone());
        };

        match value {
            JsonValue::Null => {
                self.remove_references_under(container_id, path, true);
                self.set_data(container_id, path, JsonValue::Null)
            }
            JsonValue::Array(items) => self.merge_array(container_id, path, shape, dynamic, items),
            JsonValue::Object(fields) => {
                if self.data_at(container_id, path).map_or(false, JsonValue::is_array) {
                    return Err(GraphError::invalid_payload(
                        location(container_id, path),
                        "object written over a previously cached list",
                    ));
                }

                match self.context.entity_id_for_value(value) {
                    Some(entity_id) if !(path.is_empty() && entity_id == container_id) => {
                        self.remove_data(container_id, path);
                        self.remove_references_under(container_id, path, false);
                        self.reference_edits.push(ReferenceEdit::SetEntity {
                            container_id: container_id.to_string(),
                            path: path.clone(),
                            next: Some(entity_id.clone()),
                        });
                        self.merge_entity(&entity_id, shape, dynamic, fields)
                    }
                    _ => {
                        if self.entity_reference_at(container_id, path).is_some() {
                            self.reference_edits.push(ReferenceEdit::SetEntity {
                                container_id: container_id.to_string(),
                                path: path.clone(),
                                next: None,
                            });
                        }
                        if !self.data_at(container_id, path).map_or(false, JsonValue::is_object) {
                            self.set_data(container_id, path, JsonValue::empty_object())?;
                        }
                        self.merge_fields(container_id, path, shape, dynamic, fields)
                    }
                }
            }
            _ => Err(GraphError::invalid_payload(
                location(container_id, path),
                format!("expected an object or list for a selection, got {}", value),
            )),
        }
    }

    fn merge_array(
        &mut self,
        container_id: &str,
        path: &mut Vec<PathPart>,
        shape: &Shape,
        dynamic: Option<&ExpandedFieldMap>,
        items: &[JsonValue],
    ) -> Result<()> {
        let previous_len = match self.data_at(container_id, path) {
            Some(JsonValue::Array(previous)) => Some(previous.len()),
            Some(JsonValue::Null) | None => None,
            Some(_) => {
                return Err(GraphError::invalid_payload(
                    location(container_id, path),
                    "list written over a previously cached non-list value",
                ))
            }
        };
        if self.entity_reference_at(container_id, path).is_some() {
            return Err(GraphError::invalid_payload(
                location(container_id, path),
                "list written over a previously cached entity",
            ));
        }

        match previous_len {
            Some(len) if items.len() > len => {
                return Err(GraphError::invalid_payload(
                    location(container_id, path),
                    format!("list of {} items written over a previously cached list of {}", items.len(), len),
                ));
            }
            Some(len) => {
                if items.len() < len {
                    self.remove_references_past(container_id, path, items.len());
                    let node = self.node_mut(container_id, NodeKind::Entity);
                    if let Some(data) = node.data.as_mut() {
                        data.resize_array(path, items.len());
                    }
                }
            }
            None => {
                self.set_data(container_id, path, JsonValue::array(vec![JsonValue::Null; items.len()]))?;
            }
        }

        for (index, item) in items.iter().enumerate() {
            path.push(PathPart::Index(index));
            self.merge_value(container_id, path, Some(shape), dynamic, item)?;
            path.pop();
        }
        Ok(())
    }

    fn merge_entity(
        &mut self,
        entity_id: &str,
        shape: &Shape,
        dynamic: Option<&ExpandedFieldMap>,
        fields: &JsonObject,
    ) -> Result<()> {
        self.ensure_object_data(entity_id);
        self.merge_fields(entity_id, &mut Vec::new(), shape, dynamic, fields)
    }

    /// Node holding one field invocation, linked to its container
    fn ensure_parameterized_value(&mut self, container_id: &str, path: &[PathPart], param_id: &str) {
        let linked = self
            .get_node(container_id)
            .map_or(false, |node| node.outbound.iter().any(|r| r.matches(param_id, path)));
        if linked && self.get_node(param_id).is_some() {
            return;
        }

        let param = self.node_mut(param_id, NodeKind::ParameterizedValue);
        crate::graph::node::add_reference(&mut param.inbound, container_id, path);
        let container = self.node_mut(container_id, NodeKind::Entity);
        crate::graph::node::add_reference(&mut container.outbound, param_id, path);
        self.outbound_changed.insert(container_id.to_string());
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Containers whose references changed get new data identity even when no
    /// inline value changed.
    fn reissue_changed_containers(&mut self) {
        let parent = self.parent;
        for id in std::mem::take(&mut self.outbound_changed) {
            let parent_data = parent.get(&id);
            let Some(node) = self.new_nodes.get_mut(&id) else {
                continue;
            };
            if let (Some(data), Some(previous)) = (node.data.as_mut(), parent_data) {
                if data.ptr_eq(previous) {
                    *data = data.reissue();
                }
            }
        }
    }

    fn edited_node_ids(&self) -> HashSet<NodeId> {
        let mut edited: HashSet<NodeId> = self
            .removed
            .iter()
            .filter(|id| self.parent.has(id))
            .cloned()
            .collect();

        for (id, node) in &self.new_nodes {
            if self.removed.contains(id) {
                continue;
            }
            let Some(previous) = self.parent.get_node_snapshot(id) else {
                edited.insert(id.clone());
                continue;
            };
            if !same_data(previous.data.as_ref(), node.data.as_ref())
                || whole_value_target(previous) != whole_value_target(node)
            {
                edited.insert(id.clone());
            }
        }
        edited
    }

    fn transform_edited_entities(&mut self, edited: &HashSet<NodeId>) {
        if self.context.config().entity_transformer.is_none() {
            return;
        }
        for id in edited {
            let Some(node) = self.new_nodes.get_mut(id) else {
                continue;
            };
            if !node.is_entity() || is_root_id(id) {
                continue;
            }
            if let Some(data) = node.data.as_ref() {
                if let Some(transformed) = self.context.transform_entity(data) {
                    node.data = Some(transformed);
                }
            }
        }
    }
}

fn same_data(a: Option<&JsonValue>, b: Option<&JsonValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

/// Entity a node stands in for as a whole, as a parameterized field holding
/// a single entity does. Such a node carries no data of its own.
fn whole_value_target(node: &NodeSnapshot) -> Option<&str> {
    node.outbound
        .iter()
        .find(|r| r.path.as_deref().is_some_and(|path| path.is_empty()))
        .map(|r| r.id.as_str())
}

/// Every node reaching an edited node through inbound references, edited
/// nodes excluded. Each node is visited once, so cycles terminate.
fn rebuilt_node_ids(snapshot: &GraphSnapshot, edited: &HashSet<NodeId>) -> HashSet<NodeId> {
    let start: Vec<NodeId> = edited.iter().filter(|id| snapshot.has(id)).cloned().collect();
    bfs(&start, usize::MAX, |id| {
        snapshot
            .get_node_snapshot(id)
            .map(|node| node.inbound.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    })
    .into_iter()
    .filter(|id| !edited.contains(id))
    .collect()
}

fn location(container_id: &str, path: &[PathPart]) -> String {
    if path.is_empty() {
        container_id.to_string()
    } else {
        format!("{}.{}", container_id, render_path(path))
    }
}
