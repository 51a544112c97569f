//! Long-term and short-term cache tiers.

use std::fmt;

use iconkit_types::IconSetDocument;
use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;
use crate::manager::PersistentCache;

/// Storage tier selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Long-term storage that survives restarts.
    Local,
    /// Short-term storage scoped to the current session.
    Session,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Local => write!(f, "local"),
            CacheKind::Session => write!(f, "session"),
        }
    }
}

/// Both cache tiers.
///
/// Reads check the local tier first. Writes go to the local tier when it is
/// enabled and fall back to the session tier otherwise.
pub struct CacheTiers {
    local: PersistentCache,
    session: PersistentCache,
}

impl CacheTiers {
    /// Creates tiers from two caches.
    pub fn new(local: PersistentCache, session: PersistentCache) -> Self {
        Self { local, session }
    }

    /// Creates process-local tiers, mostly useful for tests.
    pub fn in_memory() -> Self {
        Self::new(PersistentCache::in_memory(), PersistentCache::in_memory())
    }

    /// Returns the cache for `kind`.
    pub fn get(&self, kind: CacheKind) -> &PersistentCache {
        match kind {
            CacheKind::Local => &self.local,
            CacheKind::Session => &self.session,
        }
    }

    /// Enables one tier.
    pub fn enable(&self, kind: CacheKind) {
        self.get(kind).enable();
    }

    /// Disables one tier. Its data is kept.
    pub fn disable(&self, kind: CacheKind) {
        self.get(kind).disable();
    }

    /// Loads every valid entry of both tiers.
    pub fn load(&self) -> Vec<CacheEntry> {
        let mut entries = self.local.load();
        entries.extend(self.session.load());
        entries
    }

    /// Reads from the local tier, then the session tier.
    pub fn read(&self, provider: &str, prefix: &str) -> Option<IconSetDocument> {
        self.local
            .read(provider, prefix)
            .or_else(|| self.session.read(provider, prefix))
    }

    /// Removes `(provider, prefix)` from both tiers.
    pub fn remove(&self, provider: &str, prefix: &str) {
        self.local.remove(provider, prefix);
        self.session.remove(provider, prefix);
    }

    /// Writes to the first enabled tier.
    pub fn write(&self, provider: &str, prefix: &str, document: &IconSetDocument) {
        if self.local.is_enabled() {
            self.local.write(provider, prefix, document);
        } else if self.session.is_enabled() {
            self.session.write(provider, prefix, document);
        }
    }
}
