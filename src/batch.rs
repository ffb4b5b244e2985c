//! Delta batching and transactions.
//!
//! Pending deltas accumulate per `(graph, relation)` with running
//! cancellation: a tuple inserted and deleted within one batch disappears
//! before the graph ever sees it. Outside a transaction the engine flushes
//! after every ingress call (or once the configured threshold is reached);
//! `begin`/`end` suspend all auto-flushing by depth counter, so nested
//! transactions commit only when the outermost one ends. Rolling back
//! discards everything pending.

use crate::delta::Delta;
use indexmap::IndexMap;

/// Per-(graph, relation) pending delta buffers.
#[derive(Debug, Default)]
pub(crate) struct BatchManager {
    pending: IndexMap<(String, String), Delta>,
    txn_depth: usize,
    flush_threshold: usize,
}

impl BatchManager {
    pub fn new(flush_threshold: usize) -> Self {
        BatchManager {
            pending: IndexMap::new(),
            txn_depth: 0,
            flush_threshold,
        }
    }

    /// Coalesce a delta into the `(graph, relation)` buffer.
    pub fn add(&mut self, graph: &str, relation: &str, delta: Delta) {
        if delta.is_empty() {
            return;
        }
        self.pending
            .entry((graph.to_string(), relation.to_string()))
            .or_default()
            .merge(delta);
    }

    /// Whether the engine should flush now: never inside a transaction,
    /// otherwise once pending tuples reach the threshold (a threshold of 0
    /// flushes on every ingress call).
    pub fn should_flush(&self) -> bool {
        if self.txn_depth > 0 {
            return false;
        }
        let pending: usize = self.pending.values().map(Delta::len).sum();
        pending > 0 && pending >= self.flush_threshold
    }

    pub fn in_transaction(&self) -> bool {
        self.txn_depth > 0
    }

    /// Enter a (possibly nested) transaction.
    pub fn begin(&mut self) {
        self.txn_depth += 1;
    }

    /// Leave a transaction level. Returns true when the outermost level
    /// ended and pending batches should be committed.
    pub fn end(&mut self) -> bool {
        debug_assert!(self.txn_depth > 0, "end_transaction without begin");
        self.txn_depth = self.txn_depth.saturating_sub(1);
        self.txn_depth == 0
    }

    /// Discard everything pending and leave all transaction levels.
    pub fn rollback(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        self.txn_depth = 0;
        tracing::debug!(batches = dropped, "transaction_rolled_back");
    }

    /// Drain non-empty batches, optionally restricted to one graph.
    pub fn drain(&mut self, graph: Option<&str>) -> Vec<(String, String, Delta)> {
        let mut drained = Vec::new();
        let keys: Vec<(String, String)> = self
            .pending
            .keys()
            .filter(|(g, _)| graph.map_or(true, |want| want == g))
            .cloned()
            .collect();
        for key in keys {
            if let Some(delta) = self.pending.shift_remove(&key) {
                if !delta.is_empty() {
                    drained.push((key.0, key.1, delta));
                }
            }
        }
        drained
    }
}
