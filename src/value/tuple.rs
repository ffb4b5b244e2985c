//! Immutable ordered atom vectors.

use crate::error::{EngineError, EngineResult};
use crate::value::Atom;
use std::fmt;
use std::sync::Arc;

/// Maximum tuple arity the `[arity:u8]` encoding header can express.
pub const MAX_ARITY: usize = 255;

/// An immutable ordered vector of atoms.
///
/// Tuples are cheaply cloneable (the atom storage is shared) and freely
/// sharable across tries, operator state, and output snapshots. Comparison is
/// componentwise under the [`Atom`] order; for equal arity this matches the
/// byte order of [`Tuple::encode`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tuple {
    atoms: Arc<[Atom]>,
}

impl Tuple {
    /// Create a tuple from atoms. Panics in debug builds if the arity
    /// exceeds [`MAX_ARITY`]; ingestion paths validate before construction.
    pub fn new(atoms: Vec<Atom>) -> Self {
        debug_assert!(atoms.len() <= MAX_ARITY);
        Tuple {
            atoms: atoms.into(),
        }
    }

    /// Number of atoms.
    pub fn arity(&self) -> usize {
        self.atoms.len()
    }

    /// Atom at position `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    /// All atoms in order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Project onto `indices`, preserving their order. Duplicate indices are
    /// allowed; out-of-range indices fail.
    pub fn project(&self, indices: &[usize]) -> EngineResult<Tuple> {
        let mut atoms = Vec::with_capacity(indices.len());
        for &i in indices {
            let atom = self.atoms.get(i).ok_or(EngineError::InvalidProjection {
                index: i,
                arity: self.arity(),
            })?;
            atoms.push(atom.clone());
        }
        Ok(Tuple::new(atoms))
    }

    /// Canonical `[arity:u8][atom bytes]*` encoding.
    pub fn encode(&self) -> Vec<u8> {
        let payload: usize = self.atoms.iter().map(Atom::encoded_len).sum();
        let mut out = Vec::with_capacity(1 + payload);
        out.push(self.arity() as u8);
        for atom in self.atoms.iter() {
            atom.write_encoded(&mut out);
        }
        out
    }

    /// Decode a tuple produced by [`Tuple::encode`]. Trailing bytes fail.
    pub fn decode(bytes: &[u8]) -> EngineResult<Tuple> {
        let arity = *bytes
            .first()
            .ok_or_else(|| EngineError::MalformedEncoding("empty tuple encoding".into()))?
            as usize;
        let mut pos = 1;
        let mut atoms = Vec::with_capacity(arity);
        for _ in 0..arity {
            atoms.push(Atom::decode(bytes, &mut pos)?);
        }
        if pos != bytes.len() {
            return Err(EngineError::MalformedEncoding(format!(
                "{} trailing bytes after tuple payload",
                bytes.len() - pos
            )));
        }
        Ok(Tuple::new(atoms))
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{atom}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<Vec<Atom>> for Tuple {
    fn from(atoms: Vec<Atom>) -> Self {
        Tuple::new(atoms)
    }
}
