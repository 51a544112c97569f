//! Library configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use iconkit_api::PartialApiConfig;
use iconkit_cache::{CacheOptions, CacheTiers, PersistentCache, default_cache_dir};
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

// Embed the schema
const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/config.json");
static CONFIG_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Configuration for an [`IconLibrary`](crate::IconLibrary).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryConfig {
    /// Whether icon names without a prefix are accepted.
    #[serde(default)]
    pub simple_names: bool,

    /// API providers by name. `""` replaces the public API.
    #[serde(default)]
    pub providers: BTreeMap<String, PartialApiConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Base directory for resolving relative cache directories.
    /// This is usually the directory containing the configuration file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Settings for both cache tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub local: CacheTierConfig,
    #[serde(default)]
    pub session: CacheTierConfig,
}

/// Settings for one cache tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTierConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Storage directory. Without one the local tier uses the platform
    /// cache directory and the session tier stays in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_hours: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            dir: None,
            max_entries: None,
            max_age_hours: None,
        }
    }
}

/// Retry settings for icons that failed to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            base_delay: self
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
        }
    }
}

impl CacheTierConfig {
    /// Entry limits, falling back to the cache defaults.
    pub fn options(&self) -> CacheOptions {
        let defaults = CacheOptions::default();
        CacheOptions {
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            max_age: self
                .max_age_hours
                .map(|hours| Duration::from_secs(hours * 60 * 60))
                .unwrap_or(defaults.max_age),
        }
    }

    fn resolve_dir(&self, base_dir: Option<&Path>) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        match base_dir {
            Some(base) if dir.is_relative() => Some(base.join(dir)),
            _ => Some(dir.clone()),
        }
    }

    fn build(&self, base_dir: Option<&Path>, fallback_dir: Option<PathBuf>) -> PersistentCache {
        let cache = match self.resolve_dir(base_dir).or(fallback_dir) {
            Some(dir) => PersistentCache::with_dir(dir),
            None => PersistentCache::in_memory(),
        };
        let cache = cache.with_options(self.options());
        if !self.enabled {
            cache.disable();
        }
        cache
    }
}

impl CacheConfig {
    /// Builds both tiers.
    pub fn build(&self, base_dir: Option<&Path>) -> CacheTiers {
        let local_fallback = match (&self.local.dir, default_cache_dir()) {
            (Some(_), _) => None,
            (None, Ok(dir)) => Some(dir),
            (None, Err(e)) => {
                warn!("Using in-memory local cache: {}", e);
                None
            }
        };

        CacheTiers::new(
            self.local.build(base_dir, local_fallback),
            self.session.build(base_dir, None),
        )
    }
}

impl LibraryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let mut config = Self::from_json(&content)?;
        if let Some(parent) = path.parent() {
            config.base_dir = Some(parent.to_path_buf());
        }

        Ok(config)
    }

    /// Parses configuration from JSON string with schema validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::parse(e.to_string()))?;

        let schema = CONFIG_SCHEMA.get_or_init(|| {
            let schema_json: serde_json::Value =
                serde_json::from_str(SCHEMA_JSON).expect("Invalid embedded config schema");
            Validator::new(&schema_json).expect("Invalid config schema compilation")
        });

        if let Err(e) = schema.validate(&value) {
            let error_msg = format!("{} at {}", e, e.instance_path());
            return Err(ConfigError::validation(error_msg));
        }

        serde_json::from_value(value).map_err(|e| ConfigError::validation(e.to_string()))
    }
}
