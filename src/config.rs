//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - Leapjoin.toml (default configuration)
//! - Environment variables (LEAPJOIN_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # Leapjoin.toml
//! auto_register_relations = true
//!
//! [validation]
//! strict_types = true
//!
//! [batch]
//! flush_threshold = 1000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! LEAPJOIN_AUTO_REGISTER_RELATIONS=true
//! LEAPJOIN_BATCH__FLUSH_THRESHOLD=500
//! ```

use crate::error::{EngineError, EngineResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Register unknown relations on first insert with an inferred untyped
    /// schema instead of failing
    #[serde(default)]
    pub auto_register_relations: bool,

    /// Run cold start when a query is registered without an explicit choice
    #[serde(default = "default_true")]
    pub cold_start_by_default: bool,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Batching settings
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Check typed columns of pre-built tuples on ingress; `any` columns
    /// always pass
    #[serde(default)]
    pub strict_types: bool,
}

/// Batching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pending tuples needed before an auto-flush outside a transaction;
    /// 0 flushes on every ingress call
    #[serde(default)]
    pub flush_threshold: usize,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            auto_register_relations: false,
            cold_start_by_default: true,
            validation: ValidationConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from Leapjoin.toml and LEAPJOIN_* environment
    /// variables, with defaults for everything absent.
    pub fn load() -> EngineResult<Self> {
        Figment::from(figment::providers::Serialized::defaults(
            EngineConfig::default(),
        ))
        .merge(Toml::file("Leapjoin.toml"))
        .merge(Env::prefixed("LEAPJOIN_").split("__"))
        .extract()
        .map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = EngineConfig::default();
        assert!(!config.auto_register_relations);
        assert!(config.cold_start_by_default);
        assert!(!config.validation.strict_types);
        assert_eq!(config.batch.flush_threshold, 0);
    }
}
