//! Leapfrog level cursors.
//!
//! A [`LevelIterator`] walks the atoms extending one `(level, prefix)` of a
//! trie in ascending order, exposing the Leapfrog Triejoin cursor surface:
//! `key`, `next`, `seek_ge`, `at_end`. Cursors are forward-only; advancing
//! or seeking an exhausted cursor is a no-op. A [`TrieFactory`] owns tries
//! by name and opens cursors against them.

use crate::error::{EngineError, EngineResult};
use crate::trie::TupleTrie;
use crate::value::Atom;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::ops::Bound;

/// Ascending cursor over the children of one `(level, prefix)`.
#[derive(Debug, Clone)]
pub struct LevelIterator<'a> {
    children: Option<&'a BTreeSet<Atom>>,
    current: Option<&'a Atom>,
}

impl<'a> LevelIterator<'a> {
    /// Open a cursor on the atoms extending `prefix` at `level`. A prefix
    /// with no extensions yields a cursor that is already at the end.
    pub fn open(trie: &'a TupleTrie, level: usize, prefix: &[Atom]) -> Self {
        let children = trie.children(level, prefix);
        let current = children.and_then(BTreeSet::first);
        LevelIterator { children, current }
    }

    /// The atom under the cursor, or `None` once exhausted.
    pub fn key(&self) -> Option<&'a Atom> {
        self.current
    }

    /// Whether the cursor is exhausted.
    pub fn at_end(&self) -> bool {
        self.current.is_none()
    }

    /// Advance to the next atom. No-op at the end.
    pub fn next(&mut self) {
        if let (Some(set), Some(cur)) = (self.children, self.current) {
            self.current = set
                .range((Bound::Excluded(cur), Bound::Unbounded))
                .next();
        }
    }

    /// Reposition to the least atom `>= target`. The cursor never moves
    /// backwards; seeking below the current key or past the end is a no-op.
    pub fn seek_ge(&mut self, target: &Atom) {
        match (self.children, self.current) {
            (Some(set), Some(cur)) if cur < target => {
                self.current = set
                    .range((Bound::Included(target), Bound::Unbounded))
                    .next();
            }
            _ => {}
        }
    }
}

/// Named trie registry producing level cursors.
///
/// The graph runtime keys one factory by relation name for scan state; join
/// nodes key private factories by input edge so an LFTJ pass always sees an
/// unchanging snapshot of every trie it visits.
#[derive(Debug, Default)]
pub struct TrieFactory {
    tries: IndexMap<String, TupleTrie>,
}

impl TrieFactory {
    pub fn new() -> Self {
        TrieFactory::default()
    }

    /// Register an empty trie under a name.
    pub fn register(&mut self, name: &str, arity: usize) -> EngineResult<()> {
        if self.tries.contains_key(name) {
            return Err(EngineError::AlreadyDefined(name.to_string()));
        }
        self.tries.insert(name.to_string(), TupleTrie::new(arity));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tries.contains_key(name)
    }

    pub fn trie(&self, name: &str) -> Option<&TupleTrie> {
        self.tries.get(name)
    }

    pub fn require(&self, name: &str) -> EngineResult<&TupleTrie> {
        self.tries
            .get(name)
            .ok_or_else(|| EngineError::UnknownRelation(name.to_string()))
    }

    pub fn require_mut(&mut self, name: &str) -> EngineResult<&mut TupleTrie> {
        self.tries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownRelation(name.to_string()))
    }

    /// Open a level cursor on a registered trie.
    pub fn open(&self, name: &str, level: usize, prefix: &[Atom]) -> EngineResult<LevelIterator<'_>> {
        Ok(LevelIterator::open(self.require(name)?, level, prefix))
    }

    /// Drop every registered trie's contents, keeping registrations.
    pub fn clear_all(&mut self) {
        for trie in self.tries.values_mut() {
            trie.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Tuple;

    fn trie_of(rows: &[&[i32]]) -> TupleTrie {
        let mut trie = TupleTrie::new(rows[0].len());
        for row in rows {
            let tuple = Tuple::new(row.iter().map(|&v| Atom::Integer(v)).collect());
            trie.insert(&tuple).unwrap();
        }
        trie
    }

    #[test]
    fn walks_children_in_order() {
        let trie = trie_of(&[&[3], &[1], &[2]]);
        let mut it = LevelIterator::open(&trie, 0, &[]);
        let mut seen = Vec::new();
        while let Some(key) = it.key() {
            seen.push(key.clone());
            it.next();
        }
        assert_eq!(
            seen,
            vec![Atom::Integer(1), Atom::Integer(2), Atom::Integer(3)]
        );
        assert!(it.at_end());
        it.next(); // no-op past the end
        assert!(it.at_end());
    }

    #[test]
    fn seek_ge_lands_on_least_upper_key() {
        let trie = trie_of(&[&[1], &[4], &[9]]);
        let mut it = LevelIterator::open(&trie, 0, &[]);
        it.seek_ge(&Atom::Integer(3));
        assert_eq!(it.key(), Some(&Atom::Integer(4)));
        it.seek_ge(&Atom::Integer(4)); // already there
        assert_eq!(it.key(), Some(&Atom::Integer(4)));
        it.seek_ge(&Atom::Integer(2)); // never moves backwards
        assert_eq!(it.key(), Some(&Atom::Integer(4)));
        it.seek_ge(&Atom::Integer(10));
        assert!(it.at_end());
        it.seek_ge(&Atom::Integer(1)); // no-op once exhausted
        assert!(it.at_end());
    }

    #[test]
    fn cursor_under_prefix_sees_only_extensions() {
        let trie = trie_of(&[&[1, 7], &[1, 5], &[2, 9]]);
        let mut it = LevelIterator::open(&trie, 1, &[Atom::Integer(1)]);
        assert_eq!(it.key(), Some(&Atom::Integer(5)));
        it.next();
        assert_eq!(it.key(), Some(&Atom::Integer(7)));
        it.next();
        assert!(it.at_end());
    }

    #[test]
    fn factory_opens_by_name() {
        let mut factory = TrieFactory::new();
        factory.register("edge", 2).unwrap();
        assert!(factory.register("edge", 2).is_err());
        assert!(factory.open("missing", 0, &[]).is_err());
        let it = factory.open("edge", 0, &[]).unwrap();
        assert!(it.at_end());
    }
}
