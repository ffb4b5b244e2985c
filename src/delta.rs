//! Normalized tuple deltas.
//!
//! A [`Delta`] is a pair of tuple sets `(adds, removes)` kept normalized:
//! no tuple appears on both sides. Merging two deltas cancels a tuple that
//! is added by one and removed by the other, so the order in which deltas
//! arrive within a batch never changes the coalesced result.

use crate::value::Tuple;
use indexmap::IndexSet;
use std::fmt;

/// A normalized `(adds, removes)` pair of tuple sets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Delta {
    adds: IndexSet<Tuple>,
    removes: IndexSet<Tuple>,
}

impl Delta {
    pub fn new() -> Self {
        Delta::default()
    }

    /// Build from raw add/remove lists, normalizing as tuples are applied.
    pub fn from_parts(
        adds: impl IntoIterator<Item = Tuple>,
        removes: impl IntoIterator<Item = Tuple>,
    ) -> Self {
        let mut delta = Delta::new();
        for t in adds {
            delta.push_add(t);
        }
        for t in removes {
            delta.push_remove(t);
        }
        delta
    }

    /// A delta that only adds.
    pub fn of_adds(adds: impl IntoIterator<Item = Tuple>) -> Self {
        Delta::from_parts(adds, std::iter::empty())
    }

    /// A delta that only removes.
    pub fn of_removes(removes: impl IntoIterator<Item = Tuple>) -> Self {
        Delta::from_parts(std::iter::empty(), removes)
    }

    /// Record an addition. A pending removal of the same tuple cancels.
    pub fn push_add(&mut self, tuple: Tuple) {
        if !self.removes.shift_remove(&tuple) {
            self.adds.insert(tuple);
        }
    }

    /// Record a removal. A pending addition of the same tuple cancels.
    pub fn push_remove(&mut self, tuple: Tuple) {
        if !self.adds.shift_remove(&tuple) {
            self.removes.insert(tuple);
        }
    }

    /// Merge another delta into this one under the cancellation law.
    pub fn merge(&mut self, other: Delta) {
        for t in other.adds {
            self.push_add(t);
        }
        for t in other.removes {
            self.push_remove(t);
        }
    }

    pub fn adds(&self) -> impl ExactSizeIterator<Item = &Tuple> {
        self.adds.iter()
    }

    pub fn removes(&self) -> impl ExactSizeIterator<Item = &Tuple> {
        self.removes.iter()
    }

    pub fn contains_add(&self, tuple: &Tuple) -> bool {
        self.adds.contains(tuple)
    }

    pub fn contains_remove(&self, tuple: &Tuple) -> bool {
        self.removes.contains(tuple)
    }

    /// Both sides empty. Empty deltas are never propagated.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Total number of tuples on both sides.
    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }
}

impl fmt::Debug for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delta")
            .field("adds", &self.adds.iter().collect::<Vec<_>>())
            .field("removes", &self.removes.iter().collect::<Vec<_>>())
            .finish()
    }
}
