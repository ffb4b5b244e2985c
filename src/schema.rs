//! # Relation Schemas
//!
//! A schema is an ordered sequence of uniquely named, typed columns. The
//! `any` column type is a runtime pass-through; typed columns direct scalar
//! coercion on ingress and, in strict mode, validate pre-built tuples.

use crate::error::{EngineError, EngineResult};
use crate::value::{Atom, AtomType, Row, Scalar, Tuple, MAX_ARITY};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of one schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// No type constraint
    Any,
    Boolean,
    Integer,
    Float,
    String,
    Symbol,
    Id,
}

impl ColumnType {
    /// Parse a type name (case-insensitive). `"any"` is accepted alongside
    /// the atom type names.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("any") {
            return Some(ColumnType::Any);
        }
        AtomType::parse(s).map(ColumnType::from)
    }

    /// Whether an atom satisfies this column type.
    pub fn matches(&self, atom: &Atom) -> bool {
        match self {
            ColumnType::Any => true,
            ColumnType::Boolean => atom.atom_type() == AtomType::Boolean,
            ColumnType::Integer => atom.atom_type() == AtomType::Integer,
            ColumnType::Float => atom.atom_type() == AtomType::Float,
            ColumnType::String => atom.atom_type() == AtomType::String,
            ColumnType::Symbol => atom.atom_type() == AtomType::Symbol,
            ColumnType::Id => atom.atom_type() == AtomType::Id,
        }
    }
}

impl From<AtomType> for ColumnType {
    fn from(t: AtomType) -> Self {
        match t {
            AtomType::Boolean => ColumnType::Boolean,
            AtomType::Integer => ColumnType::Integer,
            AtomType::Float => ColumnType::Float,
            AtomType::String => ColumnType::String,
            AtomType::Symbol => ColumnType::Symbol,
            AtomType::Id => ColumnType::Id,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Any => write!(f, "any"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Symbol => write!(f, "symbol"),
            ColumnType::Id => write!(f, "id"),
        }
    }
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// An ordered sequence of uniquely named columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    columns: Vec<Column>,
}

impl RelationSchema {
    /// Build a schema from `(name, type)` entries. Fails on an empty column
    /// list, a duplicate or empty name, or arity beyond the tuple encoding
    /// limit.
    pub fn new<N: Into<String>>(entries: Vec<(N, ColumnType)>) -> EngineResult<Self> {
        let columns: Vec<Column> = entries
            .into_iter()
            .map(|(name, column_type)| Column {
                name: name.into(),
                column_type,
            })
            .collect();
        if columns.is_empty() {
            return Err(EngineError::InvalidSchema("no columns".into()));
        }
        if columns.len() > MAX_ARITY {
            return Err(EngineError::InvalidSchema(format!(
                "arity {} exceeds maximum {MAX_ARITY}",
                columns.len()
            )));
        }
        for (i, col) in columns.iter().enumerate() {
            if col.name.is_empty() {
                return Err(EngineError::InvalidSchema(format!("column {i} has no name")));
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(EngineError::InvalidSchema(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(RelationSchema { columns })
    }

    /// An all-`any` schema with generated column names, used when
    /// auto-registering relations on first insert.
    pub fn untyped(arity: usize) -> EngineResult<Self> {
        RelationSchema::new(
            (0..arity)
                .map(|i| (format!("col{i}"), ColumnType::Any))
                .collect(),
        )
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Resolve a named subset to column indices, preserving the order of the
    /// requested names.
    pub fn project_names(&self, relation: &str, names: &[&str]) -> EngineResult<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| EngineError::UnknownColumn {
                    relation: relation.to_string(),
                    column: (*name).to_string(),
                })
            })
            .collect()
    }

    /// The schema restricted to the given indices, with fresh column order.
    pub fn project(&self, indices: &[usize]) -> EngineResult<RelationSchema> {
        let mut columns = Vec::with_capacity(indices.len());
        for &i in indices {
            let col = self
                .columns
                .get(i)
                .ok_or(EngineError::InvalidProjection {
                    index: i,
                    arity: self.arity(),
                })?;
            columns.push(col.clone());
        }
        Ok(RelationSchema { columns })
    }

    /// The same column types under new names (Rename node support).
    pub fn renamed<N: Into<String>>(&self, names: Vec<N>) -> EngineResult<RelationSchema> {
        if names.len() != self.arity() {
            return Err(EngineError::ArityMismatch {
                expected: self.arity(),
                found: names.len(),
            });
        }
        RelationSchema::new(
            names
                .into_iter()
                .zip(self.columns.iter())
                .map(|(name, col)| (name.into(), col.column_type))
                .collect(),
        )
    }

    /// Convert one ingested row to a tuple, coercing scalars per column.
    ///
    /// Pre-built [`Row::Tuple`] rows skip coercion; their types are checked
    /// only when `strict` is set (`any` columns always pass).
    pub fn coerce_row(&self, relation: &str, row: Row, strict: bool) -> EngineResult<Tuple> {
        match row {
            Row::Tuple(tuple) => {
                self.validate_tuple(relation, &tuple, strict)?;
                Ok(tuple)
            }
            Row::Positional(values) => {
                if values.len() != self.arity() {
                    return Err(EngineError::ArityMismatch {
                        expected: self.arity(),
                        found: values.len(),
                    });
                }
                let atoms = self
                    .columns
                    .iter()
                    .zip(values)
                    .map(|(col, v)| coerce_scalar(relation, col, v))
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(Tuple::new(atoms))
            }
            Row::Named(mut map) => {
                let mut atoms = Vec::with_capacity(self.arity());
                for col in &self.columns {
                    let value = map.remove(&col.name).ok_or_else(|| EngineError::MissingValue {
                        relation: relation.to_string(),
                        column: col.name.clone(),
                    })?;
                    atoms.push(coerce_scalar(relation, col, value)?);
                }
                if let Some(extra) = map.into_keys().next() {
                    return Err(EngineError::UnknownColumn {
                        relation: relation.to_string(),
                        column: extra,
                    });
                }
                Ok(Tuple::new(atoms))
            }
        }
    }

    /// Arity check always; per-column type check only in strict mode.
    pub fn validate_tuple(&self, relation: &str, tuple: &Tuple, strict: bool) -> EngineResult<()> {
        if tuple.arity() != self.arity() {
            return Err(EngineError::ArityMismatch {
                expected: self.arity(),
                found: tuple.arity(),
            });
        }
        if strict {
            for (col, atom) in self.columns.iter().zip(tuple.atoms()) {
                if !col.column_type.matches(atom) {
                    return Err(EngineError::TypeMismatch {
                        column: format!("{relation}.{}", col.name),
                        expected: col.column_type.to_string(),
                        found: atom.atom_type().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn scalar_kind(scalar: &Scalar) -> &'static str {
    match scalar {
        Scalar::Bool(_) => "boolean",
        Scalar::Int(_) => "integer",
        Scalar::Float(_) => "float",
        Scalar::Text(_) => "string",
    }
}

fn fits_i32(i: i64) -> bool {
    i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX)
}

/// Schema-directed scalar coercion.
///
/// Untyped columns follow the default mapping: booleans stay boolean,
/// 32-bit integer-valued numbers become `Integer`, other numbers `Float`,
/// `:`-prefixed text becomes `Symbol`, other text `String`. Typed columns
/// convert where lossless and fail otherwise.
fn coerce_scalar(relation: &str, col: &Column, scalar: Scalar) -> EngineResult<Atom> {
    let mismatch = |scalar: &Scalar| EngineError::TypeMismatch {
        column: format!("{relation}.{}", col.name),
        expected: col.column_type.to_string(),
        found: scalar_kind(scalar).to_string(),
    };
    match col.column_type {
        ColumnType::Any => Ok(match scalar {
            Scalar::Bool(b) => Atom::Boolean(b),
            Scalar::Int(i) if fits_i32(i) => Atom::Integer(i as i32),
            Scalar::Int(i) => Atom::Float(i as f64),
            Scalar::Float(f) => Atom::Float(f),
            Scalar::Text(s) if s.starts_with(':') => Atom::Symbol(s),
            Scalar::Text(s) => Atom::String(s),
        }),
        ColumnType::Boolean => match scalar {
            Scalar::Bool(b) => Ok(Atom::Boolean(b)),
            other => Err(mismatch(&other)),
        },
        ColumnType::Integer => match scalar {
            Scalar::Int(i) if fits_i32(i) => Ok(Atom::Integer(i as i32)),
            Scalar::Float(f) if f.fract() == 0.0 && fits_i32(f as i64) => {
                Ok(Atom::Integer(f as i32))
            }
            other => Err(mismatch(&other)),
        },
        ColumnType::Float => match scalar {
            Scalar::Int(i) => Ok(Atom::Float(i as f64)),
            Scalar::Float(f) => Ok(Atom::Float(f)),
            other => Err(mismatch(&other)),
        },
        ColumnType::String => match scalar {
            Scalar::Text(s) => Ok(Atom::String(s)),
            other => Err(mismatch(&other)),
        },
        ColumnType::Symbol => match scalar {
            Scalar::Text(s) if s.starts_with(':') => Ok(Atom::Symbol(s)),
            other => Err(mismatch(&other)),
        },
        ColumnType::Id => match scalar {
            Scalar::Text(s) => Ok(Atom::Id(s)),
            other => Err(mismatch(&other)),
        },
    }
}
