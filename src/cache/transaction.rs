//! Transactions over the baseline and optimistic snapshots

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::{CacheContext, RawOperation};
use crate::editor::{merge, SnapshotEditor};
use crate::error::Result;
use crate::graph::{GraphSnapshot, NodeId};
use crate::query::ParsedQuery;
use crate::read::{read, QueryResult};
use crate::value::JsonValue;

/// Writes recorded under one optimistic change id
#[derive(Clone, Debug)]
pub struct OptimisticUpdate {
    pub change_id: String,
    pub writes: Vec<(Arc<ParsedQuery>, JsonValue)>,
}

/// Optimistic updates in submission order, replayed on every new baseline
#[derive(Clone, Debug, Default)]
pub struct OptimisticUpdateQueue {
    updates: Vec<OptimisticUpdate>,
}

impl OptimisticUpdateQueue {
    pub fn new() -> Self {
        Self { updates: Vec::new() }
    }

    pub fn enqueue(&mut self, update: OptimisticUpdate) {
        self.updates.push(update);
    }

    /// Drop every update recorded under `change_id`
    pub fn remove(&mut self, change_id: &str) -> bool {
        let before = self.updates.len();
        self.updates.retain(|update| update.change_id != change_id);
        self.updates.len() != before
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn change_ids(&self) -> impl Iterator<Item = &str> {
        self.updates.iter().map(|update| update.change_id.as_str())
    }

    /// Optimistic snapshot for `baseline`
    pub fn apply(&self, context: &CacheContext, baseline: &Arc<GraphSnapshot>) -> Result<Arc<GraphSnapshot>> {
        if self.updates.is_empty() {
            return Ok(Arc::clone(baseline));
        }
        let mut editor = SnapshotEditor::new(context, baseline);
        for update in &self.updates {
            for (query, payload) in &update.writes {
                editor.merge(query, payload)?;
            }
        }
        Ok(Arc::new(editor.commit().snapshot))
    }
}

/// Published state of a cache
#[derive(Clone, Debug)]
pub struct CacheSnapshot {
    pub baseline: Arc<GraphSnapshot>,
    /// Baseline with every queued optimistic update applied
    pub optimistic: Arc<GraphSnapshot>,
    pub optimistic_queue: OptimisticUpdateQueue,
}

impl CacheSnapshot {
    pub fn new(baseline: GraphSnapshot) -> Self {
        let baseline = Arc::new(baseline);
        CacheSnapshot {
            optimistic: Arc::clone(&baseline),
            baseline,
            optimistic_queue: OptimisticUpdateQueue::new(),
        }
    }
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        CacheSnapshot::new(GraphSnapshot::new())
    }
}

/// Group of writes committed together.
///
/// A baseline transaction writes to the baseline and replays the optimistic
/// queue on top when committed. An optimistic transaction writes to the
/// optimistic snapshot and is queued under its change id.
pub struct CacheTransaction<'c> {
    context: &'c CacheContext,
    snapshot: CacheSnapshot,
    change_id: Option<String>,
    writes: Vec<(Arc<ParsedQuery>, JsonValue)>,
    edited_node_ids: HashSet<NodeId>,
    warnings: Vec<String>,
}

impl<'c> CacheTransaction<'c> {
    pub fn new(context: &'c CacheContext, snapshot: CacheSnapshot) -> Self {
        CacheTransaction {
            context,
            snapshot,
            change_id: None,
            writes: Vec::new(),
            edited_node_ids: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn optimistic(context: &'c CacheContext, snapshot: CacheSnapshot, change_id: impl Into<String>) -> Self {
        let mut transaction = CacheTransaction::new(context, snapshot);
        transaction.change_id = Some(change_id.into());
        transaction
    }

    pub fn is_optimistic(&self) -> bool {
        self.change_id.is_some()
    }

    fn working(&self) -> &Arc<GraphSnapshot> {
        if self.is_optimistic() {
            &self.snapshot.optimistic
        } else {
            &self.snapshot.baseline
        }
    }

    /// Read against the snapshot this transaction writes to
    pub fn read(&self, raw: &RawOperation) -> Result<QueryResult> {
        let query = self.context.parse_operation(raw)?;
        Ok(read(&query, self.working(), false))
    }

    pub fn write(&mut self, raw: &RawOperation, payload: &JsonValue) -> Result<()> {
        let query = self.context.parse_operation(raw)?;
        let edit = merge(self.context, self.working(), &query, payload)?;

        let snapshot = Arc::new(edit.snapshot);
        if self.is_optimistic() {
            self.snapshot.optimistic = snapshot;
            self.writes.push((query, payload.clone()));
        } else {
            self.snapshot.baseline = snapshot;
        }
        self.edited_node_ids.extend(edit.edited_node_ids);
        self.warnings.extend(edit.warnings);
        Ok(())
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// New cache state and the ids edited in the snapshot observers see
    pub fn commit(self) -> Result<(CacheSnapshot, HashSet<NodeId>)> {
        let CacheTransaction {
            context,
            mut snapshot,
            change_id,
            writes,
            mut edited_node_ids,
            ..
        } = self;

        match change_id {
            Some(change_id) => {
                if !writes.is_empty() {
                    snapshot.optimistic_queue.enqueue(OptimisticUpdate { change_id, writes });
                }
            }
            None => {
                let previous = Arc::clone(&snapshot.optimistic);
                snapshot.optimistic = snapshot.optimistic_queue.apply(context, &snapshot.baseline)?;
                if !snapshot.optimistic_queue.is_empty() {
                    edited_node_ids.extend(changed_node_ids(&previous, &snapshot.optimistic));
                }
            }
        }

        Ok((snapshot, edited_node_ids))
    }
}

/// Ids whose data differs by identity between two snapshots
pub fn changed_node_ids(before: &GraphSnapshot, after: &GraphSnapshot) -> HashSet<NodeId> {
    let mut changed = HashSet::new();
    for (id, node) in before.iter() {
        let same = match (node.data.as_ref(), after.get_shared(id).and_then(|n| n.data.as_ref())) {
            (None, None) => after.get_shared(id).is_some(),
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        };
        if !same {
            changed.insert(id.clone());
        }
    }
    for (id, _) in after.iter() {
        if before.get_shared(id).is_none() {
            changed.insert(id.clone());
        }
    }
    changed
}
