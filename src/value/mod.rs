//! # Value Type System
//!
//! Core value types: the six-variant [`Atom`] scalar, arbitrary arity
//! [`Tuple`]s, and the [`Scalar`]/[`Row`]/[`Rows`] ingestion helpers.
//!
//! Atoms are immutable and totally ordered. The order is variant precedence
//! (`Boolean < Integer < Float < String < Symbol < ID`) followed by the
//! variant-natural order, and it agrees byte-for-byte with the canonical
//! encoding: comparing two atoms has the same sign as lexicographically
//! comparing their [`Atom::encode`] outputs. Tries and level iterators rely
//! on that agreement, so `Ord` and the encoding must change together.
//!
//! ## Usage
//!
//! ```rust
//! use leapjoin::value::{Atom, Tuple};
//!
//! let tuple = Tuple::new(vec![
//!     Atom::Integer(1),
//!     Atom::String("hello".into()),
//!     Atom::Float(3.14),
//! ]);
//! assert_eq!(tuple.arity(), 3);
//! ```

mod rows;
mod tuple;

pub use rows::{Row, Rows, Scalar};
pub use tuple::{Tuple, MAX_ARITY};

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type tags of the canonical encoding. Assigned in variant-precedence order
/// so that byte-lexicographic comparison of encodings agrees with [`Atom`]'s
/// `Ord`.
pub(crate) const TAG_BOOLEAN: u8 = 0x01;
pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_FLOAT: u8 = 0x03;
pub(crate) const TAG_STRING: u8 = 0x04;
pub(crate) const TAG_SYMBOL: u8 = 0x05;
pub(crate) const TAG_ID: u8 = 0x06;

/// Supported atom types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomType {
    /// Boolean (`false < true`)
    Boolean,
    /// Signed 32-bit integer
    Integer,
    /// IEEE-754 double
    Float,
    /// UTF-8 string
    String,
    /// Interned keyword; the text always starts with `:`
    Symbol,
    /// Opaque string identifier
    Id,
}

impl AtomType {
    /// Parse a type name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Some(AtomType::Boolean),
            "int" | "integer" | "i32" => Some(AtomType::Integer),
            "float" | "double" | "f64" | "number" => Some(AtomType::Float),
            "string" | "str" | "text" => Some(AtomType::String),
            "symbol" => Some(AtomType::Symbol),
            "id" => Some(AtomType::Id),
            _ => None,
        }
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomType::Boolean => write!(f, "boolean"),
            AtomType::Integer => write!(f, "integer"),
            AtomType::Float => write!(f, "float"),
            AtomType::String => write!(f, "string"),
            AtomType::Symbol => write!(f, "symbol"),
            AtomType::Id => write!(f, "id"),
        }
    }
}

/// A typed immutable scalar value.
#[derive(Debug, Clone)]
pub enum Atom {
    Boolean(bool),
    Integer(i32),
    Float(f64),
    String(String),
    Symbol(String),
    Id(String),
}

impl Atom {
    /// Build a symbol, checking the leading-colon invariant.
    pub fn symbol(text: impl Into<String>) -> EngineResult<Self> {
        let text = text.into();
        if text.starts_with(':') {
            Ok(Atom::Symbol(text))
        } else {
            Err(EngineError::InvalidSchema(format!(
                "symbol '{text}' must start with ':'"
            )))
        }
    }

    /// The type of this atom.
    pub fn atom_type(&self) -> AtomType {
        match self {
            Atom::Boolean(_) => AtomType::Boolean,
            Atom::Integer(_) => AtomType::Integer,
            Atom::Float(_) => AtomType::Float,
            Atom::String(_) => AtomType::String,
            Atom::Symbol(_) => AtomType::Symbol,
            Atom::Id(_) => AtomType::Id,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Atom::Boolean(_) => TAG_BOOLEAN,
            Atom::Integer(_) => TAG_INTEGER,
            Atom::Float(_) => TAG_FLOAT,
            Atom::String(_) => TAG_STRING,
            Atom::Symbol(_) => TAG_SYMBOL,
            Atom::Id(_) => TAG_ID,
        }
    }

    /// Append the canonical `[tag][payload]` encoding to `out`.
    ///
    /// Integer payloads are offset-binary (`x ^ i32::MIN` as big-endian u32)
    /// and float payloads use the IEEE total-order bit flip, so the payload
    /// bytes sort the same way the values do.
    pub fn write_encoded(&self, out: &mut Vec<u8>) {
        match self {
            Atom::Boolean(b) => {
                out.push(TAG_BOOLEAN);
                out.push(u8::from(*b));
            }
            Atom::Integer(i) => {
                out.push(TAG_INTEGER);
                let biased = (*i as u32) ^ 0x8000_0000;
                out.extend_from_slice(&biased.to_be_bytes());
            }
            Atom::Float(f) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&order_preserving_f64(*f).to_be_bytes());
            }
            Atom::String(s) => write_string_like(out, TAG_STRING, s),
            Atom::Symbol(s) => write_string_like(out, TAG_SYMBOL, s),
            Atom::Id(s) => write_string_like(out, TAG_ID, s),
        }
    }

    /// The canonical byte encoding of this atom.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_encoded(&mut out);
        out
    }

    /// Exact length of [`Atom::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        match self {
            Atom::Boolean(_) => 2,
            Atom::Integer(_) => 5,
            Atom::Float(_) => 9,
            Atom::String(s) | Atom::Symbol(s) | Atom::Id(s) => 5 + s.len(),
        }
    }

    /// Decode one atom starting at `bytes[*pos]`, advancing `pos` past it.
    pub fn decode(bytes: &[u8], pos: &mut usize) -> EngineResult<Self> {
        let tag = *bytes
            .get(*pos)
            .ok_or_else(|| EngineError::MalformedEncoding("truncated atom tag".into()))?;
        *pos += 1;
        match tag {
            TAG_BOOLEAN => {
                let b = take(bytes, pos, 1)?[0];
                match b {
                    0 => Ok(Atom::Boolean(false)),
                    1 => Ok(Atom::Boolean(true)),
                    other => Err(EngineError::MalformedEncoding(format!(
                        "invalid boolean payload {other:#04x}"
                    ))),
                }
            }
            TAG_INTEGER => {
                let raw = take(bytes, pos, 4)?;
                let biased = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                Ok(Atom::Integer((biased ^ 0x8000_0000) as i32))
            }
            TAG_FLOAT => {
                let raw = take(bytes, pos, 8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Ok(Atom::Float(restore_f64(u64::from_be_bytes(buf))))
            }
            TAG_STRING => Ok(Atom::String(read_string_like(bytes, pos)?)),
            TAG_SYMBOL => Ok(Atom::Symbol(read_string_like(bytes, pos)?)),
            TAG_ID => Ok(Atom::Id(read_string_like(bytes, pos)?)),
            other => Err(EngineError::MalformedEncoding(format!(
                "unknown atom tag {other:#04x}"
            ))),
        }
    }
}

fn write_string_like(out: &mut Vec<u8>, tag: u8, s: &str) {
    out.push(tag);
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_string_like(bytes: &[u8], pos: &mut usize) -> EngineResult<String> {
    let raw = take(bytes, pos, 4)?;
    let len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let payload = take(bytes, pos, len)?;
    String::from_utf8(payload.to_vec())
        .map_err(|e| EngineError::MalformedEncoding(format!("invalid UTF-8 payload: {e}")))
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> EngineResult<&'a [u8]> {
    let end = *pos + n;
    if end > bytes.len() {
        return Err(EngineError::MalformedEncoding(format!(
            "expected {n} payload bytes at offset {pos}"
        )));
    }
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

/// Map an f64 to a u64 whose unsigned order equals IEEE total order.
fn order_preserving_f64(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & 0x8000_0000_0000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000_0000_0000
    }
}

fn restore_f64(mapped: u64) -> f64 {
    let bits = if mapped & 0x8000_0000_0000_0000 != 0 {
        mapped & !0x8000_0000_0000_0000
    } else {
        !mapped
    };
    f64::from_bits(bits)
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::Boolean(a), Atom::Boolean(b)) => a == b,
            (Atom::Integer(a), Atom::Integer(b)) => a == b,
            // Bit equality keeps Eq consistent with total_cmp and the encoding
            (Atom::Float(a), Atom::Float(b)) => a.to_bits() == b.to_bits(),
            (Atom::String(a), Atom::String(b))
            | (Atom::Symbol(a), Atom::Symbol(b))
            | (Atom::Id(a), Atom::Id(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Atom::Boolean(b) => b.hash(state),
            Atom::Integer(i) => i.hash(state),
            Atom::Float(f) => f.to_bits().hash(state),
            Atom::String(s) | Atom::Symbol(s) | Atom::Id(s) => s.hash(state),
        }
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Atom::Boolean(a), Atom::Boolean(b)) => a.cmp(b),
            (Atom::Integer(a), Atom::Integer(b)) => a.cmp(b),
            (Atom::Float(a), Atom::Float(b)) => a.total_cmp(b),
            (Atom::String(a), Atom::String(b))
            | (Atom::Symbol(a), Atom::Symbol(b))
            | (Atom::Id(a), Atom::Id(b)) => {
                // Length before contents: the order of the length-prefixed
                // canonical encoding.
                a.len().cmp(&b.len()).then_with(|| a.as_bytes().cmp(b.as_bytes()))
            }
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Boolean(b) => write!(f, "{b}"),
            Atom::Integer(i) => write!(f, "{i}"),
            Atom::Float(x) => write!(f, "{x}"),
            Atom::String(s) => write!(f, "{s:?}"),
            Atom::Symbol(s) => write!(f, "{s}"),
            Atom::Id(s) => write!(f, "#{s}"),
        }
    }
}

impl From<bool> for Atom {
    fn from(b: bool) -> Self {
        Atom::Boolean(b)
    }
}

impl From<i32> for Atom {
    fn from(i: i32) -> Self {
        Atom::Integer(i)
    }
}

impl From<f64> for Atom {
    fn from(f: f64) -> Self {
        Atom::Float(f)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        if s.starts_with(':') {
            Atom::Symbol(s.to_string())
        } else {
            Atom::String(s.to_string())
        }
    }
}

/// Encode a run of atoms back to back, without an arity header. Trie prefix
/// keys use this form.
pub(crate) fn encode_atoms(atoms: &[Atom]) -> Vec<u8> {
    let mut out = Vec::with_capacity(atoms.iter().map(Atom::encoded_len).sum());
    for atom in atoms {
        atom.write_encoded(&mut out);
    }
    out
}
