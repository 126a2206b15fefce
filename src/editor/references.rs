//! Reference edit log
//!
//! Edits queued while walking a payload and applied in one batch once the walk
//! is complete.

use super::SnapshotEditor;
use crate::graph::node::{add_reference, remove_reference};
use crate::graph::{NodeId, NodeKind};
use crate::value::PathPart;

/// Change to the edges of one container
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceEdit {
    /// Point the entity reference at `path` to `next`, or clear it
    SetEntity {
        container_id: NodeId,
        path: Vec<PathPart>,
        next: Option<NodeId>,
    },
    /// Drop one specific reference
    Remove {
        container_id: NodeId,
        path: Vec<PathPart>,
        id: NodeId,
    },
}

/// Pending reference edits, in submission order
#[derive(Debug, Default)]
pub struct ReferenceEditLog {
    edits: Vec<ReferenceEdit>,
}

impl ReferenceEditLog {
    pub fn new() -> Self {
        Self { edits: Vec::new() }
    }

    pub fn push(&mut self, edit: ReferenceEdit) {
        self.edits.push(edit);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ReferenceEdit> + '_ {
        self.edits.drain(..)
    }
}

impl<'a> SnapshotEditor<'a> {
    /// Apply every queued edit. Targets that lose a reference become orphan
    /// candidates.
    pub(super) fn apply_reference_edits(&mut self) {
        let edits: Vec<ReferenceEdit> = self.reference_edits.drain().collect();
        for edit in edits {
            match edit {
                ReferenceEdit::SetEntity {
                    container_id,
                    path,
                    next,
                } => {
                    let previous = self.entity_reference_at(&container_id, &path);
                    if previous == next {
                        continue;
                    }
                    if let Some(previous) = previous {
                        self.unlink(&container_id, &path, &previous);
                    }
                    if let Some(next) = next {
                        self.link(&container_id, &path, &next);
                    }
                }
                ReferenceEdit::Remove { container_id, path, id } => {
                    self.unlink(&container_id, &path, &id);
                }
            }
        }
    }

    fn link(&mut self, container_id: &str, path: &[PathPart], target_id: &str) {
        add_reference(&mut self.node_mut(container_id, NodeKind::Entity).outbound, target_id, path);
        add_reference(&mut self.node_mut(target_id, NodeKind::Entity).inbound, container_id, path);
        self.outbound_changed.insert(container_id.to_string());
    }

    fn unlink(&mut self, container_id: &str, path: &[PathPart], target_id: &str) {
        if remove_reference(&mut self.node_mut(container_id, NodeKind::Entity).outbound, target_id, path) {
            self.outbound_changed.insert(container_id.to_string());
        }
        if self.get_node(target_id).is_some() {
            remove_reference(&mut self.node_mut(target_id, NodeKind::Entity).inbound, container_id, path);
            self.orphan_candidates.push(target_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_preserves_order() {
        let mut log = ReferenceEditLog::new();
        assert!(log.is_empty());

        log.push(ReferenceEdit::SetEntity {
            container_id: "ROOT_QUERY".to_string(),
            path: vec![PathPart::from("viewer")],
            next: Some("1".to_string()),
        });
        log.push(ReferenceEdit::Remove {
            container_id: "ROOT_QUERY".to_string(),
            path: vec![PathPart::from("viewer")],
            id: "1".to_string(),
        });
        assert_eq!(log.len(), 2);

        let drained: Vec<_> = log.drain().collect();
        assert!(matches!(drained[0], ReferenceEdit::SetEntity { .. }));
        assert!(matches!(drained[1], ReferenceEdit::Remove { .. }));
        assert!(log.is_empty());
    }
}
