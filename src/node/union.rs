//! Union: set union with cross-input contributor counting.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::value::Tuple;
use indexmap::IndexMap;

/// One contributor count per tuple, shared across every input edge, so a
/// tuple present in two inputs is emitted once and survives until the last
/// contributor retracts it.
#[derive(Debug)]
pub(crate) struct UnionOp {
    counts: IndexMap<Tuple, u64>,
}

impl UnionOp {
    pub fn new() -> Self {
        UnionOp {
            counts: IndexMap::new(),
        }
    }

    pub fn on_delta(&mut self, _edge: usize, delta: &Delta) -> EngineResult<Delta> {
        let mut out = Delta::new();
        for tuple in delta.adds() {
            let count = self.counts.entry(tuple.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                out.push_add(tuple.clone());
            }
        }
        for tuple in delta.removes() {
            let count = self.counts.get_mut(tuple).ok_or_else(|| {
                EngineError::Invariant(format!("union contributor underflow for {tuple}"))
            })?;
            *count -= 1;
            if *count == 0 {
                self.counts.shift_remove(tuple);
                out.push_remove(tuple.clone());
            }
        }
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Atom;

    fn t(i: i32) -> Tuple {
        Tuple::new(vec![Atom::Integer(i)])
    }

    #[test]
    fn second_contributor_is_silent() {
        let mut op = UnionOp::new();
        assert_eq!(op.on_delta(0, &Delta::of_adds([t(1)])).unwrap().len(), 1);
        assert!(op.on_delta(1, &Delta::of_adds([t(1)])).unwrap().is_empty());
        assert!(op.on_delta(0, &Delta::of_removes([t(1)])).unwrap().is_empty());
        let out = op.on_delta(1, &Delta::of_removes([t(1)])).unwrap();
        assert_eq!(out.removes().len(), 1);
    }
}
