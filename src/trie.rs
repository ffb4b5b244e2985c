//! Leveled prefix index over tuples.
//!
//! A [`TupleTrie`] of arity `n` maps, for each level `0..n`, an encoded
//! prefix of that many atoms to the ordered set of atoms extending it.
//! Full tuples carry a reference count at the leaf so repeated insertion is
//! tolerated without double-linking; set semantics on operator outputs are
//! enforced by the operators' own counting, not here.
//!
//! Children at every `(level, prefix)` are kept in [`Atom`] order, which by
//! construction equals the byte order of their canonical encodings - the
//! property Leapfrog Triejoin's `seek_ge` relies on.

use crate::error::{EngineError, EngineResult};
use crate::value::{encode_atoms, Atom, Tuple};
use std::collections::{BTreeMap, BTreeSet};

/// Level-ordered prefix index with leaf reference counts.
#[derive(Debug, Clone)]
pub struct TupleTrie {
    arity: usize,
    /// `levels[i]`: encoded `i`-atom prefix -> ordered children at level `i`.
    levels: Vec<BTreeMap<Vec<u8>, BTreeSet<Atom>>>,
    /// Distinct tuples with their insertion counts.
    leaves: BTreeMap<Tuple, u32>,
}

impl TupleTrie {
    /// An empty trie for tuples of the given arity.
    pub fn new(arity: usize) -> Self {
        debug_assert!(arity >= 1);
        TupleTrie {
            arity,
            levels: (0..arity).map(|_| BTreeMap::new()).collect(),
            leaves: BTreeMap::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of distinct tuples.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn check_arity(&self, tuple: &Tuple) -> EngineResult<()> {
        if tuple.arity() != self.arity {
            return Err(EngineError::ArityMismatch {
                expected: self.arity,
                found: tuple.arity(),
            });
        }
        Ok(())
    }

    /// Insert a tuple, incrementing its leaf count. Returns the new count;
    /// a return of 1 means the tuple is newly present.
    pub fn insert(&mut self, tuple: &Tuple) -> EngineResult<u32> {
        self.check_arity(tuple)?;
        let count = self.leaves.entry(tuple.clone()).or_insert(0);
        *count += 1;
        let new_count = *count;
        if new_count == 1 {
            let atoms = tuple.atoms();
            for level in 0..self.arity {
                self.levels[level]
                    .entry(encode_atoms(&atoms[..level]))
                    .or_default()
                    .insert(atoms[level].clone());
            }
        }
        Ok(new_count)
    }

    /// Decrement a tuple's leaf count, unlinking it bottom-up once the count
    /// reaches zero and deleting intermediate entries that become empty.
    ///
    /// Returns `None` if the tuple was not present, otherwise the remaining
    /// count (0 = fully removed).
    pub fn remove(&mut self, tuple: &Tuple) -> EngineResult<Option<u32>> {
        self.check_arity(tuple)?;
        let Some(count) = self.leaves.get_mut(tuple) else {
            return Ok(None);
        };
        *count -= 1;
        if *count > 0 {
            return Ok(Some(*count));
        }
        self.leaves.remove(tuple);

        let atoms = tuple.atoms();
        for level in (0..self.arity).rev() {
            let key = encode_atoms(&atoms[..level]);
            let Some(children) = self.levels[level].get_mut(&key) else {
                return Err(EngineError::Invariant(format!(
                    "trie unlink: no children under prefix at level {level} for {tuple}"
                )));
            };
            if !children.remove(&atoms[level]) {
                return Err(EngineError::Invariant(format!(
                    "trie unlink: child missing at level {level} for {tuple}"
                )));
            }
            if !children.is_empty() {
                break;
            }
            self.levels[level].remove(&key);
        }
        Ok(Some(0))
    }

    /// Whether any tuple extends `prefix` at the given level.
    pub fn has_prefix(&self, level: usize, prefix: &[Atom]) -> bool {
        debug_assert_eq!(level, prefix.len());
        self.levels
            .get(level)
            .is_some_and(|m| m.contains_key(&encode_atoms(prefix)))
    }

    /// The ordered children extending `prefix` at `level`, if any.
    pub(crate) fn children(&self, level: usize, prefix: &[Atom]) -> Option<&BTreeSet<Atom>> {
        self.levels.get(level)?.get(&encode_atoms(prefix))
    }

    /// Atoms extending `prefix` at `level`, strictly ascending.
    pub fn sorted_atoms_at(&self, level: usize, prefix: &[Atom]) -> Vec<Atom> {
        self.children(level, prefix)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All distinct prefixes present at a level, decoded back to atoms.
    pub fn prefixes_at(&self, level: usize) -> EngineResult<Vec<Vec<Atom>>> {
        let Some(map) = self.levels.get(level) else {
            return Ok(Vec::new());
        };
        map.keys()
            .map(|key| {
                let mut atoms = Vec::with_capacity(level);
                let mut pos = 0;
                while pos < key.len() {
                    atoms.push(Atom::decode(key, &mut pos)?);
                }
                Ok(atoms)
            })
            .collect()
    }

    /// Whether the tuple is present (count > 0).
    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.leaves.contains_key(tuple)
    }

    /// The leaf count for a tuple (0 if absent).
    pub fn count(&self, tuple: &Tuple) -> u32 {
        self.leaves.get(tuple).copied().unwrap_or(0)
    }

    /// Distinct tuples, in tuple order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.leaves.keys()
    }

    /// Drop all tuples and levels.
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
        self.leaves.clear();
    }

    /// True when every level map is empty. Used by tests to verify unlink.
    pub fn levels_empty(&self) -> bool {
        self.levels.iter().all(BTreeMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(values: &[i32]) -> Tuple {
        Tuple::new(values.iter().map(|&v| Atom::Integer(v)).collect())
    }

    #[test]
    fn insert_then_remove_leaves_trie_empty() {
        let mut trie = TupleTrie::new(3);
        trie.insert(&t(&[1, 2, 3])).unwrap();
        assert_eq!(trie.remove(&t(&[1, 2, 3])).unwrap(), Some(0));
        assert!(trie.is_empty());
        assert!(trie.levels_empty());
    }

    #[test]
    fn duplicate_insert_counts_up_and_down() {
        let mut trie = TupleTrie::new(2);
        assert_eq!(trie.insert(&t(&[1, 2])).unwrap(), 1);
        assert_eq!(trie.insert(&t(&[1, 2])).unwrap(), 2);
        assert_eq!(trie.remove(&t(&[1, 2])).unwrap(), Some(1));
        assert!(trie.contains(&t(&[1, 2])));
        assert_eq!(trie.remove(&t(&[1, 2])).unwrap(), Some(0));
        assert!(!trie.contains(&t(&[1, 2])));
    }

    #[test]
    fn removing_absent_tuple_reports_none() {
        let mut trie = TupleTrie::new(1);
        assert_eq!(trie.remove(&t(&[9])).unwrap(), None);
    }

    #[test]
    fn children_stay_sorted() {
        let mut trie = TupleTrie::new(2);
        for v in [5, 1, 9, 3] {
            trie.insert(&t(&[1, v])).unwrap();
        }
        let atoms = trie.sorted_atoms_at(1, &[Atom::Integer(1)]);
        let mut sorted = atoms.clone();
        sorted.sort();
        assert_eq!(atoms, sorted);
        assert_eq!(atoms.len(), 4);
    }

    #[test]
    fn shared_prefixes_survive_partial_removal() {
        let mut trie = TupleTrie::new(2);
        trie.insert(&t(&[1, 2])).unwrap();
        trie.insert(&t(&[1, 3])).unwrap();
        trie.remove(&t(&[1, 2])).unwrap();
        assert!(trie.has_prefix(1, &[Atom::Integer(1)]));
        assert_eq!(
            trie.sorted_atoms_at(1, &[Atom::Integer(1)]),
            vec![Atom::Integer(3)]
        );
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut trie = TupleTrie::new(2);
        assert!(matches!(
            trie.insert(&t(&[1])),
            Err(EngineError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn prefixes_at_decodes_round_trip() {
        let mut trie = TupleTrie::new(2);
        trie.insert(&t(&[1, 2])).unwrap();
        trie.insert(&t(&[3, 4])).unwrap();
        let prefixes = trie.prefixes_at(1).unwrap();
        assert_eq!(
            prefixes,
            vec![vec![Atom::Integer(1)], vec![Atom::Integer(3)]]
        );
    }
}
