//! Cache entry types.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use iconkit_types::IconSetDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CacheError;

/// Current cache format version. Entries with any other version are dropped.
pub const CACHE_VERSION: &str = "iconkit-cache-v2";

/// A cached icon set for one `(provider, prefix)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache format version.
    pub version: String,

    /// Write timestamp in milliseconds since the Unix epoch.
    pub cached: u64,

    /// API provider.
    pub provider: String,

    /// Icon set prefix.
    pub prefix: String,

    /// Cached icon set.
    pub data: IconSetDocument,
}

/// Entry as read from storage, before the document is validated.
#[derive(Debug, Deserialize)]
struct RawEntry {
    version: String,
    cached: u64,
    provider: String,
    prefix: String,
    data: Value,
}

impl CacheEntry {
    /// Creates a new entry stamped with `cached`.
    pub fn new(
        provider: impl Into<String>,
        prefix: impl Into<String>,
        data: IconSetDocument,
        cached: u64,
    ) -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            cached,
            provider: provider.into(),
            prefix: prefix.into(),
            data,
        }
    }

    /// Parses a stored entry, validating the embedded icon set.
    pub fn parse(content: &str) -> Result<Self, CacheError> {
        let raw: RawEntry = serde_json::from_str(content)?;
        let data = IconSetDocument::from_value(raw.data)
            .map_err(|e| CacheError::corrupted(e.to_string()))?;

        if data.prefix != raw.prefix {
            return Err(CacheError::corrupted(format!(
                "prefix mismatch: entry {} holds {}",
                raw.prefix, data.prefix
            )));
        }

        Ok(Self {
            version: raw.version,
            cached: raw.cached,
            provider: raw.provider,
            prefix: raw.prefix,
            data,
        })
    }

    /// Checks the format version and age of this entry.
    pub fn is_valid(&self, now: u64, max_age: Duration) -> bool {
        if self.version != CACHE_VERSION {
            return false;
        }
        let max_age = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        now.saturating_sub(self.cached) <= max_age
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
