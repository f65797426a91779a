//! Engine-wide configuration, loadable from TOML (§11 of the expanded
//! design; built-in defaults live in [`crate::constants`]).

use crate::bounded::BoundedStoreConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the embedded database file (or `:memory:`).
    pub database_path: String,
    /// Bounded-retention quota limits.
    pub bounded_store: BoundedStoreSection,
    /// Query executor defaults.
    pub executor: ExecutorSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "ats.db".to_string(),
            bounded_store: BoundedStoreSection::default(),
            executor: ExecutorSection::default(),
        }
    }
}

/// The `[bounded_store]` TOML section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundedStoreSection {
    /// Max attestations per (actor, context) pair. Negative falls back to
    /// the built-in default; zero is honoured literally.
    pub actor_context_limit: i64,
    /// Max distinct context-arrays per actor.
    pub actor_contexts_limit: i64,
    /// Max distinct actors per subject.
    pub entity_actors_limit: i64,
}

impl Default for BoundedStoreSection {
    fn default() -> Self {
        let defaults = BoundedStoreConfig::default();
        Self {
            actor_context_limit: defaults.actor_context_limit,
            actor_contexts_limit: defaults.actor_contexts_limit,
            entity_actors_limit: defaults.entity_actors_limit,
        }
    }
}

impl From<BoundedStoreSection> for BoundedStoreConfig {
    fn from(section: BoundedStoreSection) -> Self {
        BoundedStoreConfig {
            actor_context_limit: section.actor_context_limit,
            actor_contexts_limit: section.actor_contexts_limit,
            entity_actors_limit: section.entity_actors_limit,
        }
    }
}

/// The `[executor]` TOML section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Default row limit when the caller supplies none.
    pub default_limit: i64,
    /// Hard cap enforced regardless of caller-supplied limit.
    pub global_retrieval_cap: i64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            default_limit: crate::constants::DEFAULT_EXECUTOR_LIMIT,
            global_retrieval_cap: crate::constants::GLOBAL_RETRIEVAL_CAP,
        }
    }
}

impl EngineConfig {
    /// Parse an [`EngineConfig`] from TOML text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `text` is not valid TOML for this
    /// shape.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| Error::invalid_input("config", err.to_string()))
    }

    /// Serialize this configuration back to TOML text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] on a serialization failure (should
    /// not occur for a well-formed `EngineConfig`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| Error::invalid_input("config", err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = EngineConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = EngineConfig::from_toml(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = EngineConfig::from_toml("database_path = \"custom.db\"\n").unwrap();
        assert_eq!(config.database_path, "custom.db");
        assert_eq!(config.bounded_store.actor_context_limit, 16);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let err = EngineConfig::from_toml("not = [valid").unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
