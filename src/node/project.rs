//! Project: column projection with multiplicity counting.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::value::Tuple;
use indexmap::IndexMap;

/// Projects input tuples onto a fixed index list and counts how many input
/// tuples map to each projected tuple. Only `0 -> 1` and `1 -> 0` count
/// transitions emit; within one delta all additions are emitted before any
/// removals (safe, the output is a set).
#[derive(Debug)]
pub(crate) struct ProjectOp {
    indices: Vec<usize>,
    counts: IndexMap<Tuple, u64>,
}

impl ProjectOp {
    pub fn new(indices: Vec<usize>) -> Self {
        ProjectOp {
            indices,
            counts: IndexMap::new(),
        }
    }

    pub fn on_delta(&mut self, _edge: usize, delta: &Delta) -> EngineResult<Delta> {
        let mut out = Delta::new();
        for tuple in delta.adds() {
            let p = tuple.project(&self.indices)?;
            let count = self.counts.entry(p.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                out.push_add(p);
            }
        }
        for tuple in delta.removes() {
            let p = tuple.project(&self.indices)?;
            let count = self.counts.get_mut(&p).ok_or_else(|| {
                EngineError::Invariant(format!("project multiplicity underflow for {p}"))
            })?;
            *count -= 1;
            if *count == 0 {
                self.counts.shift_remove(&p);
                out.push_remove(p);
            }
        }
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}
