//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) gives the stock
//! engine:
//!
//! ```toml
//! [conviction]
//! half_life_days = 180.0
//! recompute_interval_secs = 3600
//!
//! [path]
//! max_hops = 6
//!
//! [cache]
//! max_path_entries = 10000
//! path_ttl_secs = 1800
//!
//! [graph]
//! lock_stripes = 64
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::conviction::ConvictionConfig;
use crate::error::ConfigError;
use crate::graph::store::DEFAULT_LOCK_STRIPES;
use crate::pathfind::DEFAULT_MAX_HOPS;

/// Defaults applied to path queries that do not set their own bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDefaults {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default)]
    pub min_strength: u8,
}

fn default_max_hops() -> usize {
    DEFAULT_MAX_HOPS
}

impl Default for PathDefaults {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            min_strength: 0,
        }
    }
}

/// Graph store sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Number of writer lock stripes.
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

fn default_lock_stripes() -> usize {
    DEFAULT_LOCK_STRIPES
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            lock_stripes: default_lock_stripes(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub conviction: ConvictionConfig,
    #[serde(default)]
    pub path: PathDefaults,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

impl EngineConfig {
    /// Load and validate a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Parse and validate TOML text; `origin` names the source in errors.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.conviction;
        if !(c.half_life_days.is_finite() && c.half_life_days > 0.0) {
            return Err(invalid(format!(
                "conviction.half_life_days must be positive, got {}",
                c.half_life_days
            )));
        }
        if !(c.saturation.is_finite() && c.saturation >= 0.0) {
            return Err(invalid(format!(
                "conviction.saturation must be non-negative, got {}",
                c.saturation
            )));
        }
        if !(c.trend_window_days.is_finite() && c.trend_window_days > 0.0) {
            return Err(invalid(format!(
                "conviction.trend_window_days must be positive, got {}",
                c.trend_window_days
            )));
        }
        if c.default_reputation > 100 {
            return Err(invalid(format!(
                "conviction.default_reputation must be in 0..=100, got {}",
                c.default_reputation
            )));
        }
        if self.path.max_hops == 0 {
            return Err(invalid("path.max_hops must be at least 1".into()));
        }
        if self.path.min_strength > 100 {
            return Err(invalid(format!(
                "path.min_strength must be in 0..=100, got {}",
                self.path.min_strength
            )));
        }
        if self.graph.lock_stripes == 0 {
            return Err(invalid("graph.lock_stripes must be at least 1".into()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}
