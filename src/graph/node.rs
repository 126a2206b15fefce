//! Node snapshots: the unit of storage

use serde::{Deserialize, Serialize};

use crate::value::{JsonValue, PathPart};

pub type NodeId = String;

/// Root of query operations
pub const QUERY_ROOT_ID: &str = "ROOT_QUERY";
/// Root of mutation operations
pub const MUTATION_ROOT_ID: &str = "ROOT_MUTATION";
/// Root of subscription operations
pub const SUBSCRIPTION_ROOT_ID: &str = "ROOT_SUBSCRIPTION";

/// Roots are never garbage collected
pub fn is_root_id(id: &str) -> bool {
    matches!(id, QUERY_ROOT_ID | MUTATION_ROOT_ID | SUBSCRIPTION_ROOT_ID)
}

/// Edge between two nodes.
///
/// `path` is relative to the referencing node's data. A reference without a
/// path only participates in reachability bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeReference {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathPart>>,
}

impl NodeReference {
    pub fn new(id: impl Into<NodeId>, path: Vec<PathPart>) -> Self {
        Self {
            id: id.into(),
            path: Some(path),
        }
    }

    pub fn matches(&self, id: &str, path: &[PathPart]) -> bool {
        self.id == id && self.path.as_deref() == Some(path)
    }
}

/// Storage variant of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Normalized domain object keyed by its entity id
    #[serde(rename = "EntitySnapshot")]
    Entity,
    /// Result of one field invocation with arguments, stored out of line
    #[serde(rename = "ParameterizedValueSnapshot")]
    ParameterizedValue,
}

/// One node of a graph snapshot.
///
/// Entity-reference positions inside `data` are absent from objects (or
/// `null` inside arrays); the matching `outbound` reference records where the
/// referenced node belongs. Parameterized fields never appear in their
/// container's data.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub kind: NodeKind,
    pub data: Option<JsonValue>,
    pub inbound: Vec<NodeReference>,
    pub outbound: Vec<NodeReference>,
}

impl NodeSnapshot {
    pub fn entity(data: Option<JsonValue>) -> Self {
        Self {
            kind: NodeKind::Entity,
            data,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    pub fn parameterized_value(data: Option<JsonValue>) -> Self {
        Self {
            kind: NodeKind::ParameterizedValue,
            data,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    pub fn is_entity(&self) -> bool {
        self.kind == NodeKind::Entity
    }

    /// Outbound reference stored at exactly `path`, if any.
    ///
    /// Parameterized values share their field path with siblings that differ
    /// only by arguments, so they are skipped here.
    pub fn entity_reference_at(&self, path: &[PathPart], is_entity: impl Fn(&str) -> bool) -> Option<&NodeId> {
        self.outbound
            .iter()
            .find(|reference| reference.path.as_deref() == Some(path) && is_entity(&reference.id))
            .map(|reference| &reference.id)
    }

    /// Whether any inbound reference comes from another node
    pub fn has_foreign_inbound(&self, own_id: &str) -> bool {
        self.inbound.iter().any(|reference| reference.id != own_id)
    }
}

/// Remove the first reference matching `(id, path)`; returns whether one was found
pub(crate) fn remove_reference(references: &mut Vec<NodeReference>, id: &str, path: &[PathPart]) -> bool {
    match references.iter().position(|reference| reference.matches(id, path)) {
        Some(index) => {
            references.remove(index);
            true
        }
        None => false,
    }
}

/// Add `(id, path)` unless an identical reference is present
pub(crate) fn add_reference(references: &mut Vec<NodeReference>, id: &str, path: &[PathPart]) {
    if !references.iter().any(|reference| reference.matches(id, path)) {
        references.push(NodeReference::new(id, path.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_ids() {
        assert!(is_root_id(QUERY_ROOT_ID));
        assert!(is_root_id(MUTATION_ROOT_ID));
        assert!(is_root_id(SUBSCRIPTION_ROOT_ID));
        assert!(!is_root_id("123"));
    }

    #[test]
    fn test_reference_bookkeeping() {
        let mut references = Vec::new();
        let path = vec![PathPart::from("viewer")];
        add_reference(&mut references, "1", &path);
        add_reference(&mut references, "1", &path);
        assert_eq!(references.len(), 1);

        assert!(!remove_reference(&mut references, "2", &path));
        assert!(remove_reference(&mut references, "1", &path));
        assert!(references.is_empty());
    }

    #[test]
    fn test_foreign_inbound_ignores_self_reference() {
        let mut node = NodeSnapshot::entity(None);
        node.inbound.push(NodeReference::new("a", vec![PathPart::from("me")]));
        assert!(!node.has_foreign_inbound("a"));
        node.inbound.push(NodeReference::new("b", vec![PathPart::from("friend")]));
        assert!(node.has_foreign_inbound("a"));
    }
}
