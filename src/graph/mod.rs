//! Normalized graph: nodes, references and snapshots

pub mod id_gen;
pub mod node;
pub mod snapshot;
pub mod traversal;

pub use id_gen::{node_id_for_parameterized_value, operation_fingerprint, PARAMETERIZED_ID_SEPARATOR};
pub use node::{
    is_root_id, NodeId, NodeKind, NodeReference, NodeSnapshot, MUTATION_ROOT_ID, QUERY_ROOT_ID,
    SUBSCRIPTION_ROOT_ID,
};
pub use snapshot::{GraphSnapshot, SnapshotStats};

use crate::value::JsonValue;

/// Read access to a set of nodes
pub trait GraphStore {
    /// Full node (data plus references)
    fn get_node_snapshot(&self, id: &str) -> Option<&NodeSnapshot>;

    /// Ids of every node
    fn all_ids(&self) -> Vec<NodeId>;

    /// Node data, if the node exists and has any
    fn get(&self, id: &str) -> Option<&JsonValue> {
        self.get_node_snapshot(id).and_then(|node| node.data.as_ref())
    }

    fn has(&self, id: &str) -> bool {
        self.get_node_snapshot(id).is_some()
    }
}
