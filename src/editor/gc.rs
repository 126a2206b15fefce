//! Orphan collection
//!
//! Only nodes that lost a reference during the edit are examined, so the cost
//! is bounded by the edit rather than the size of the graph.

use std::collections::{HashSet, VecDeque};

use super::SnapshotEditor;
use crate::graph::traversal::{backward_reachability, Reachability};
use crate::graph::{is_root_id, NodeId, NodeKind};

impl<'a> SnapshotEditor<'a> {
    /// Remove every candidate no root can reach, cascading through the
    /// outbound references of removed nodes.
    pub(super) fn collect_orphans(&mut self) {
        let mut queue: VecDeque<NodeId> = self.orphan_candidates.drain(..).collect();
        let mut examined = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if is_root_id(&id) || self.removed.contains(&id) || !examined.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.get_node(&id) else {
                continue;
            };

            let unreachable = if !node.has_foreign_inbound(&id) {
                vec![id.clone()]
            } else {
                // Still referenced: only a cycle detached from every root can
                // keep it alive.
                let reachability = backward_reachability(
                    &id,
                    |current| {
                        self.get_node(current)
                            .map(|node| node.inbound.iter().map(|r| r.id.clone()).collect())
                            .unwrap_or_default()
                    },
                    is_root_id,
                );
                match reachability {
                    Reachability::Reachable => continue,
                    Reachability::Unreachable(ids) => ids,
                }
            };

            for removed_id in &unreachable {
                self.removed.insert(removed_id.clone());
            }
            for removed_id in unreachable {
                for target in self.detach(&removed_id) {
                    examined.remove(&target);
                    queue.push_back(target);
                }
            }
        }
    }

    /// Drop inbound references held by surviving targets of `id`; returns the
    /// targets.
    fn detach(&mut self, id: &str) -> Vec<NodeId> {
        let targets: Vec<NodeId> = self
            .get_node(id)
            .map(|node| node.outbound.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default();

        let mut survivors = Vec::new();
        for target in targets {
            if self.removed.contains(&target) || survivors.contains(&target) {
                continue;
            }
            if self.get_node(&target).is_none() {
                continue;
            }
            self.node_mut(&target, NodeKind::Entity).inbound.retain(|r| r.id != id);
            survivors.push(target);
        }
        tracing::trace!("Collected orphan {}", id);
        survivors
    }
}
