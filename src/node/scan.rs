//! Scan: the entry point of one base relation into one graph.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::trie::TupleTrie;
use crate::value::Tuple;

/// Owns the relation's trie - the state tape of the source - and forwards
/// presence transitions downstream. Re-inserting a present tuple bumps the
/// leaf count without emitting; removing a tuple that was never present is
/// ignored.
#[derive(Debug)]
pub(crate) struct ScanOp {
    relation: String,
    trie: TupleTrie,
}

impl ScanOp {
    pub fn new(relation: impl Into<String>, arity: usize) -> Self {
        ScanOp {
            relation: relation.into(),
            trie: TupleTrie::new(arity),
        }
    }

    /// The currently present tuples, for external snapshots.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.trie.tuples()
    }

    pub fn on_delta(&mut self, edge: usize, delta: &Delta) -> EngineResult<Delta> {
        if edge != 0 {
            return Err(EngineError::Invariant(format!(
                "scan of '{}' received a delta on edge {edge}",
                self.relation
            )));
        }
        let mut out = Delta::new();
        for tuple in delta.adds() {
            if self.trie.insert(tuple)? == 1 {
                out.push_add(tuple.clone());
            }
        }
        for tuple in delta.removes() {
            if self.trie.remove(tuple)? == Some(0) {
                out.push_remove(tuple.clone());
            }
        }
        tracing::debug!(
            relation = %self.relation,
            emitted = out.len(),
            "scan_delta_applied"
        );
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.trie.clear();
    }
}
