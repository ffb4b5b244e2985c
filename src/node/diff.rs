//! Diff: left EXCEPT right on a key.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::value::{encode_atoms, Atom, Tuple};
use indexmap::{IndexMap, IndexSet};

/// Anti-join on a key attribute list. A left tuple is visible while no right
/// tuple shares its key. The right side is counted per key, so a key backed
/// by several right tuples suppresses the left side until the last one goes;
/// the `0 -> 1` support transition retracts every stored left tuple with the
/// key, and `1 -> 0` resuscitates them.
///
/// Edge 0 is the left input, edge 1 the right input; the runtime passes the
/// edge a delta arrived on.
#[derive(Debug)]
pub(crate) struct DiffOp {
    left_key: Vec<usize>,
    right_key: Vec<usize>,
    /// Encoded key -> left tuples currently present with that key.
    left_by_key: IndexMap<Vec<u8>, IndexSet<Tuple>>,
    /// Encoded key -> number of right tuples with that key.
    right_support: IndexMap<Vec<u8>, u64>,
}

impl DiffOp {
    pub fn new(left_key: Vec<usize>, right_key: Vec<usize>) -> Self {
        DiffOp {
            left_key,
            right_key,
            left_by_key: IndexMap::new(),
            right_support: IndexMap::new(),
        }
    }

    fn key_of(tuple: &Tuple, indices: &[usize]) -> EngineResult<Vec<u8>> {
        let mut atoms: Vec<Atom> = Vec::with_capacity(indices.len());
        for &i in indices {
            let atom = tuple.get(i).ok_or(EngineError::InvalidProjection {
                index: i,
                arity: tuple.arity(),
            })?;
            atoms.push(atom.clone());
        }
        Ok(encode_atoms(&atoms))
    }

    pub fn on_delta(&mut self, edge: usize, delta: &Delta) -> EngineResult<Delta> {
        match edge {
            0 => self.on_left(delta),
            1 => self.on_right(delta),
            other => Err(EngineError::Invariant(format!(
                "diff received a delta on edge {other}"
            ))),
        }
    }

    fn on_left(&mut self, delta: &Delta) -> EngineResult<Delta> {
        let mut out = Delta::new();
        for tuple in delta.adds() {
            let key = Self::key_of(tuple, &self.left_key)?;
            let suppressed = self.right_support.get(&key).copied().unwrap_or(0) > 0;
            if !self.left_by_key.entry(key).or_default().insert(tuple.clone()) {
                return Err(EngineError::Invariant(format!(
                    "diff left tuple {tuple} added twice"
                )));
            }
            if !suppressed {
                out.push_add(tuple.clone());
            }
        }
        for tuple in delta.removes() {
            let key = Self::key_of(tuple, &self.left_key)?;
            let underflow = || {
                EngineError::Invariant(format!("diff left tuple {tuple} removed while absent"))
            };
            let set = self.left_by_key.get_mut(&key).ok_or_else(underflow)?;
            if !set.shift_remove(tuple) {
                return Err(underflow());
            }
            let now_empty = set.is_empty();
            if now_empty {
                self.left_by_key.shift_remove(&key);
            }
            if self.right_support.get(&key).copied().unwrap_or(0) == 0 {
                out.push_remove(tuple.clone());
            }
        }
        Ok(out)
    }

    fn on_right(&mut self, delta: &Delta) -> EngineResult<Delta> {
        let mut out = Delta::new();
        for tuple in delta.adds() {
            let key = Self::key_of(tuple, &self.right_key)?;
            let support = self.right_support.entry(key.clone()).or_insert(0);
            *support += 1;
            if *support == 1 {
                // Newly suppressed key: retract every visible left tuple.
                if let Some(set) = self.left_by_key.get(&key) {
                    for left in set {
                        out.push_remove(left.clone());
                    }
                }
            }
        }
        for tuple in delta.removes() {
            let key = Self::key_of(tuple, &self.right_key)?;
            let support = self.right_support.get_mut(&key).ok_or_else(|| {
                EngineError::Invariant(format!("diff right support underflow for {tuple}"))
            })?;
            *support -= 1;
            if *support == 0 {
                self.right_support.shift_remove(&key);
                if let Some(set) = self.left_by_key.get(&key) {
                    for left in set {
                        out.push_add(left.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.left_by_key.clear();
        self.right_support.clear();
    }
}
