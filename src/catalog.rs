//! Catalog: schema registry for base relations.
//!
//! Tracks the declared schema of every registered relation. Query builders
//! resolve scan arities and column positions against it; ingestion uses it
//! to direct scalar coercion.

use crate::error::{EngineError, EngineResult};
use crate::schema::RelationSchema;
use indexmap::IndexMap;

/// Registry of relation schemas, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    relations: IndexMap<String, RelationSchema>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Register a relation. Registrations last the engine's lifetime.
    pub fn define(&mut self, name: &str, schema: RelationSchema) -> EngineResult<()> {
        if self.relations.contains_key(name) {
            return Err(EngineError::AlreadyDefined(name.to_string()));
        }
        self.relations.insert(name.to_string(), schema);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RelationSchema> {
        self.relations.get(name)
    }

    /// Schema lookup that fails with `RelationNotDefined`.
    pub fn require(&self, name: &str) -> EngineResult<&RelationSchema> {
        self.relations
            .get(name)
            .ok_or_else(|| EngineError::RelationNotDefined(name.to_string()))
    }

    /// All registered relation names, in registration order.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }
}
