//! Cache facade: baseline and optimistic snapshots, transactions and watchers
//!
//! Every published change hands the edited node ids to the registered
//! observers, which re-read only when their last result touched one of them.

mod transaction;

pub use transaction::{changed_node_ids, CacheSnapshot, CacheTransaction, OptimisticUpdate, OptimisticUpdateQueue};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::context::{CacheContext, Configuration, RawOperation};
use crate::error::Result;
use crate::graph::{GraphSnapshot, NodeId};
use crate::migrate::{migrate, MigrationMap};
use crate::observer::QueryObserver;
use crate::read::{read, QueryResult};
use crate::serialization::{extract, restore, SerializedSnapshot};
use crate::value::JsonValue;

pub type WatchId = u64;

pub struct Cache {
    context: CacheContext,
    snapshot: CacheSnapshot,
    observers: BTreeMap<WatchId, QueryObserver>,
    next_watch_id: WatchId,
}

impl Cache {
    pub fn new(config: Configuration) -> Self {
        Cache {
            context: CacheContext::new(config),
            snapshot: CacheSnapshot::default(),
            observers: BTreeMap::new(),
            next_watch_id: 1,
        }
    }

    pub fn context(&self) -> &CacheContext {
        &self.context
    }

    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    /// Read from the optimistic snapshot, or the baseline when `optimistic` is false
    pub fn read(&self, raw: &RawOperation, optimistic: bool) -> Result<QueryResult> {
        let query = self.context.parse_operation(raw)?;
        let snapshot = if optimistic {
            &self.snapshot.optimistic
        } else {
            &self.snapshot.baseline
        };
        Ok(read(&query, snapshot, false))
    }

    pub fn write(&mut self, raw: &RawOperation, payload: &JsonValue) -> Result<()> {
        self.transaction(|transaction| transaction.write(raw, payload))
    }

    /// Run `f` against the baseline; nothing is published if it fails
    pub fn transaction<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut CacheTransaction<'_>) -> Result<()>,
    {
        let mut transaction = CacheTransaction::new(&self.context, self.snapshot.clone());
        f(&mut transaction)?;
        let (snapshot, changed) = transaction.commit()?;
        self.publish(snapshot, changed);
        Ok(())
    }

    /// Run `f` against the optimistic snapshot, recording its writes under `change_id`
    pub fn optimistic_transaction<F>(&mut self, change_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut CacheTransaction<'_>) -> Result<()>,
    {
        let mut transaction = CacheTransaction::optimistic(&self.context, self.snapshot.clone(), change_id);
        f(&mut transaction)?;
        let (snapshot, changed) = transaction.commit()?;
        self.publish(snapshot, changed);
        Ok(())
    }

    /// Drop the optimistic update `change_id` and replay the rest on the baseline
    pub fn rollback(&mut self, change_id: &str) -> Result<bool> {
        let mut next = self.snapshot.clone();
        if !next.optimistic_queue.remove(change_id) {
            return Ok(false);
        }
        next.optimistic = next.optimistic_queue.apply(&self.context, &next.baseline)?;
        let changed = changed_node_ids(&self.snapshot.optimistic, &next.optimistic);
        tracing::debug!("Rolled back optimistic update {}", change_id);
        self.publish(next, changed);
        Ok(true)
    }

    /// Register `callback` for changes to the result of `raw`
    pub fn watch<F>(&mut self, raw: &RawOperation, callback: F) -> Result<WatchId>
    where
        F: FnMut(&QueryResult) + Send + 'static,
    {
        let query = self.context.parse_operation(raw)?;
        let observer = QueryObserver::new(query, &self.snapshot.optimistic, Box::new(callback));

        let id = self.next_watch_id;
        self.next_watch_id += 1;
        self.observers.insert(id, observer);
        Ok(id)
    }

    pub fn unwatch(&mut self, id: WatchId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub fn extract(&self, optimistic: bool) -> SerializedSnapshot {
        if optimistic {
            extract(&self.snapshot.optimistic)
        } else {
            extract(&self.snapshot.baseline)
        }
    }

    /// Replace the baseline; queued optimistic updates are replayed on top
    pub fn restore(&mut self, serialized: SerializedSnapshot) -> Result<()> {
        let baseline = restore(serialized)?;
        self.replace_baseline(baseline)
    }

    pub fn migrate(&mut self, migrations: &MigrationMap) -> Result<()> {
        let baseline = migrate(&self.snapshot.baseline, migrations)?;
        self.replace_baseline(baseline)
    }

    fn replace_baseline(&mut self, baseline: GraphSnapshot) -> Result<()> {
        let baseline = Arc::new(baseline);
        let optimistic = self.snapshot.optimistic_queue.apply(&self.context, &baseline)?;
        let changed = changed_node_ids(&self.snapshot.optimistic, &optimistic);
        let next = CacheSnapshot {
            baseline,
            optimistic,
            optimistic_queue: self.snapshot.optimistic_queue.clone(),
        };
        self.publish(next, changed);
        Ok(())
    }

    fn publish(&mut self, snapshot: CacheSnapshot, changed: HashSet<NodeId>) {
        self.snapshot = snapshot;
        if changed.is_empty() {
            return;
        }

        let mut notified = 0;
        for observer in self.observers.values_mut() {
            if observer.consume_changes(&self.snapshot.optimistic, &changed) {
                notified += 1;
            }
        }
        tracing::debug!(
            "Published {} changed nodes to {} observers ({} notified)",
            changed.len(),
            self.observers.len(),
            notified
        );
    }
}

impl Default for Cache {
    fn default() -> Self {
        Cache::new(Configuration::default())
    }
}
