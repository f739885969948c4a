// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration.
//!
//! Loaded from TOML or constructed with [`EngineConfig::default`]. Every
//! field has a default, so an empty document is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of cached query results per correlation epoch. The
    /// cache is cleared wholesale once it grows past this bound.
    pub query_cache_capacity: usize,

    /// When true, resolver forward-reference fallbacks are logged at debug
    /// instead of warn level.
    pub quiet_forward_references: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_cache_capacity: 100_000,
            quiet_forward_references: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|e| EngineError::config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.query_cache_capacity, 100_000);
        assert!(!cfg.quiet_forward_references);
    }

    #[test]
    fn fields_override_defaults() {
        let cfg = EngineConfig::from_toml_str(
            "query_cache_capacity = 16\nquiet_forward_references = true\n",
        )
        .unwrap();
        assert_eq!(cfg.query_cache_capacity, 16);
        assert!(cfg.quiet_forward_references);
    }

    #[test]
    fn loads_from_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "query_cache_capacity = 8\n").expect("write config");
        let cfg = EngineConfig::from_path(&path).unwrap();
        assert_eq!(cfg.query_cache_capacity, 8);
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = EngineConfig::from_toml_str("query_cache_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }
}
