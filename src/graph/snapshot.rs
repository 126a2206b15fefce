//! Immutable point-in-time version of the node graph

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{GraphStore, NodeId, NodeKind, NodeSnapshot};
use crate::error::{GraphError, Result};
use crate::read::QueryResult;
use crate::value::render_path;

/// Per-kind node and edge counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub entities: usize,
    pub parameterized_values: usize,
    pub references: usize,
}

/// Immutable mapping from node id to node snapshot.
///
/// Nodes are shared by `Arc` with the snapshot they were copied from; only the
/// editor produces new snapshots. The read memo is strictly additive and is
/// never carried over to a successor snapshot.
pub struct GraphSnapshot {
    values: HashMap<NodeId, Arc<NodeSnapshot>>,
    read_cache: Mutex<HashMap<u128, QueryResult>>,
    frozen: AtomicBool,
}

impl GraphSnapshot {
    /// Empty cache
    pub fn new() -> Self {
        Self::from_nodes(HashMap::new())
    }

    pub fn from_nodes(values: HashMap<NodeId, Arc<NodeSnapshot>>) -> Self {
        Self {
            values,
            read_cache: Mutex::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Node stored under `id`, or [`GraphError::NodeNotFound`]
    pub fn node(&self, id: &str) -> Result<&NodeSnapshot> {
        self.get_node_snapshot(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    /// Shared handle to a node, used to preserve identity across versions
    pub fn get_shared(&self, id: &str) -> Option<&Arc<NodeSnapshot>> {
        self.values.get(id)
    }

    pub(crate) fn values(&self) -> &HashMap<NodeId, Arc<NodeSnapshot>> {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeSnapshot)> {
        self.values.iter().map(|(id, node)| (id, node.as_ref()))
    }

    pub fn stats(&self) -> SnapshotStats {
        let mut stats = SnapshotStats::default();
        for node in self.values.values() {
            match node.kind {
                NodeKind::Entity => stats.entities += 1,
                NodeKind::ParameterizedValue => stats.parameterized_values += 1,
            }
            stats.references += node.outbound.len();
        }
        stats
    }

    /// Mark the snapshot as published and immutable.
    ///
    /// Node data cannot be mutated through a shared snapshot, so in release
    /// builds this only records the flag. Debug builds also verify reference
    /// symmetry and report violations.
    pub fn freeze(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return;
        }
        if cfg!(debug_assertions) {
            if let Err(problems) = self.check_integrity() {
                for problem in problems {
                    tracing::error!("Snapshot integrity violation: {}", problem);
                }
            }
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Verify that every outbound reference has a matching inbound reference
    /// and vice versa, and that no reference dangles.
    pub fn check_integrity(&self) -> std::result::Result<(), Vec<String>> {
        let mut problems = Vec::new();

        for (id, node) in &self.values {
            for reference in &node.outbound {
                let path = reference.path.as_deref().unwrap_or(&[]);
                match self.values.get(&reference.id) {
                    None => problems.push(format!("{} -> {} at [{}]: target missing", id, reference.id, render_path(path))),
                    Some(target) => {
                        if !target.inbound.iter().any(|r| r.id == *id && r.path == reference.path) {
                            problems.push(format!(
                                "{} -> {} at [{}]: no matching inbound reference",
                                id,
                                reference.id,
                                render_path(path)
                            ));
                        }
                    }
                }
            }
            for reference in &node.inbound {
                let path = reference.path.as_deref().unwrap_or(&[]);
                match self.values.get(&reference.id) {
                    None => problems.push(format!("{} <- {} at [{}]: source missing", id, reference.id, render_path(path))),
                    Some(source) => {
                        if !source.outbound.iter().any(|r| r.id == *id && r.path == reference.path) {
                            problems.push(format!(
                                "{} <- {} at [{}]: no matching outbound reference",
                                id,
                                reference.id,
                                render_path(path)
                            ));
                        }
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    pub(crate) fn cached_read(&self, key: u128) -> Option<QueryResult> {
        self.read_cache.lock().ok()?.get(&key).cloned()
    }

    pub(crate) fn cache_read(&self, key: u128, result: &QueryResult) {
        if let Ok(mut cache) = self.read_cache.lock() {
            cache.entry(key).or_insert_with(|| result.clone());
        }
    }
}

impl GraphStore for GraphSnapshot {
    fn get_node_snapshot(&self, id: &str) -> Option<&NodeSnapshot> {
        self.values.get(id).map(|node| node.as_ref())
    }

    fn all_ids(&self) -> Vec<NodeId> {
        self.values.keys().cloned().collect()
    }
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for GraphSnapshot {
    /// Shares every node; the read memo starts empty.
    fn clone(&self) -> Self {
        Self::from_nodes(self.values.clone())
    }
}

impl fmt::Debug for GraphSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphSnapshot")
            .field("nodes", &self.values.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
