//! # iconkit_cache
//!
//! Persistent cache for icon sets fetched by iconkit.
//!
//! ## Cache Strategy
//!
//! 1. **Keyed by icon set**: one entry per `(provider, prefix)`
//! 2. **Versioned**: entries written by another format version are dropped
//! 3. **Bounded**: entries expire after a maximum age and the oldest entries
//!    are evicted once the entry limit is reached
//!
//! ## Storage
//!
//! Entries are JSON documents stored through a [`CacheBackend`]. The file
//! backend names each file after the BLAKE3 hash of its key.

mod backend;
mod entry;
mod error;
mod manager;
mod tiers;

pub use backend::{CacheBackend, FsBackend, MemoryBackend};
pub use entry::{CACHE_VERSION, CacheEntry, now_millis};
pub use error::CacheError;
pub use manager::{
    CacheOptions, Clock, DEFAULT_MAX_AGE, DEFAULT_MAX_ENTRIES, PersistentCache, cache_key,
    default_cache_dir, is_older,
};
pub use tiers::{CacheKind, CacheTiers};
