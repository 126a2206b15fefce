//! Change detection for watched queries

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::graph::{GraphSnapshot, NodeId};
use crate::query::ParsedQuery;
use crate::read::{read, QueryResult};

pub type ObserverCallback = Box<dyn FnMut(&QueryResult) + Send>;

/// Re-reads a query when nodes it depends on change and reports results that
/// actually differ.
pub struct QueryObserver {
    query: Arc<ParsedQuery>,
    last: QueryResult,
    callback: ObserverCallback,
}

impl QueryObserver {
    pub fn new(query: Arc<ParsedQuery>, snapshot: &GraphSnapshot, callback: ObserverCallback) -> Self {
        let last = read(&query, snapshot, true);
        QueryObserver { query, last, callback }
    }

    pub fn query(&self) -> &ParsedQuery {
        &self.query
    }

    pub fn last_result(&self) -> &QueryResult {
        &self.last
    }

    /// Whether a change to `changed` can affect the last result.
    ///
    /// Incomplete results may be completed by nodes they never visited, so
    /// they are always affected.
    pub fn is_affected_by(&self, changed: &HashSet<NodeId>) -> bool {
        if !self.last.complete {
            return !changed.is_empty();
        }
        match self.last.node_ids {
            Some(ref ids) => !ids.is_disjoint(changed),
            None => true,
        }
    }

    /// Re-read if affected; the callback runs only when the result differs.
    /// Returns whether it ran.
    pub fn consume_changes(&mut self, snapshot: &GraphSnapshot, changed: &HashSet<NodeId>) -> bool {
        if !self.is_affected_by(changed) {
            return false;
        }

        let next = read(&self.query, snapshot, true);
        let unchanged = next.complete == self.last.complete
            && match (&next.result, &self.last.result) {
                (Some(a), Some(b)) => a.ptr_eq(b) || a == b,
                (None, None) => true,
                _ => false,
            };
        self.last = next;
        if unchanged {
            return false;
        }

        (self.callback)(&self.last);
        true
    }
}

impl fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("root_id", &self.query.root_id)
            .field("complete", &self.last.complete)
            .finish()
    }
}
