//! Configuration for warmpath.
//!
//! Every section has defaults, so a JSON file only needs the keys it
//! overrides:
//!
//! ```
//! use warmpath::WarmpathConfig;
//!
//! let config = WarmpathConfig::from_json_str(r#"{ "resolver": { "fuzzy_threshold": 0.92 } }"#).unwrap();
//! assert!((config.resolver.fuzzy_threshold - 0.92).abs() < f64::EPSILON);
//! assert_eq!(config.resolver.max_candidates, 5);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, WarmpathResult};

fn invalid(reason: String) -> ValidationError {
    ValidationError::InvalidConfig { reason }
}

/// Entity resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum Jaro-Winkler similarity for a fuzzy candidate.
    pub fuzzy_threshold: f64,
    /// Maximum candidates attached to an ambiguous resolution.
    pub max_candidates: usize,
    /// Number of identity lock shards.
    pub identity_lock_shards: usize,
    /// Create attempts before a contended identity gives up.
    pub max_create_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.88,
            max_candidates: 5,
            identity_lock_shards: 64,
            max_create_attempts: 3,
        }
    }
}

impl ResolverConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for out-of-range values.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(invalid(format!(
                "resolver.fuzzy_threshold must be in (0, 1] (got {})",
                self.fuzzy_threshold
            )));
        }
        if self.max_candidates == 0 {
            return Err(invalid("resolver.max_candidates must be at least 1".to_string()));
        }
        if self.identity_lock_shards == 0 {
            return Err(invalid("resolver.identity_lock_shards must be at least 1".to_string()));
        }
        if self.max_create_attempts == 0 {
            return Err(invalid("resolver.max_create_attempts must be at least 1".to_string()));
        }
        Ok(self)
    }
}

/// Connection path finder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFinderConfig {
    /// Hard ceiling on the path length a query may request, in edges.
    pub max_path_length_cap: usize,
    /// Maximum ranked paths returned per query.
    pub max_results: usize,
}

impl Default for PathFinderConfig {
    fn default() -> Self {
        Self {
            max_path_length_cap: 6,
            max_results: 100,
        }
    }
}

impl PathFinderConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero limits.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_path_length_cap == 0 {
            return Err(invalid("paths.max_path_length_cap must be at least 1".to_string()));
        }
        if self.max_results == 0 {
            return Err(invalid("paths.max_results must be at least 1".to_string()));
        }
        Ok(self)
    }
}

/// Worker pool settings for [`crate::WarmpathRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of import workers.
    pub import_workers: usize,
    /// Number of path query workers.
    pub query_workers: usize,
    /// Maximum queued jobs per pool.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            import_workers: 2,
            query_workers: 2,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero sizes.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.import_workers == 0 || self.query_workers == 0 {
            return Err(invalid("runtime worker counts must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("runtime.queue_capacity must be at least 1".to_string()));
        }
        Ok(self)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmpathConfig {
    pub resolver: ResolverConfig,
    pub paths: PathFinderConfig,
    pub runtime: RuntimeConfig,
}

impl WarmpathConfig {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidConfig` found.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            resolver: self.resolver.validate()?,
            paths: self.paths.validate()?,
            runtime: self.runtime.validate()?,
        })
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for malformed JSON or out-of-range values.
    pub fn from_json_str(json: &str) -> WarmpathResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        Ok(config.validate()?)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> WarmpathResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| invalid(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}
