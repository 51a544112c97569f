//! Persistent icon set cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use iconkit_types::IconSetDocument;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::CacheError;
use crate::backend::{CacheBackend, FsBackend, MemoryBackend};
use crate::entry::{CacheEntry, now_millis};

/// Default maximum number of cached icon sets.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// Default maximum age of a cached icon set (one week).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(168 * 60 * 60);

/// Time source returning milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Limits applied to a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum number of entries. Oldest entries are evicted first.
    pub max_entries: usize,
    /// Entries older than this are treated as absent.
    pub max_age: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    enabled: bool,
    /// Whether the backend has been scanned into `index`.
    scanned: bool,
    /// Key to write timestamp of every valid stored entry.
    index: HashMap<String, u64>,
}

/// Durable storage of fetched icon sets keyed by `(provider, prefix)`.
///
/// All storage errors are logged and treated as a miss or a no-op.
/// Disabling the cache keeps stored data so re-enabling restores it.
pub struct PersistentCache {
    backend: Box<dyn CacheBackend>,
    options: CacheOptions,
    clock: Clock,
    state: Mutex<CacheState>,
}

impl PersistentCache {
    /// Creates a cache on top of `backend`.
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            options: CacheOptions::default(),
            clock: Arc::new(now_millis),
            state: Mutex::new(CacheState {
                enabled: true,
                ..Default::default()
            }),
        }
    }

    /// Creates a file-backed cache in the platform cache directory.
    pub fn open_default() -> Result<Self, CacheError> {
        Ok(Self::with_dir(default_cache_dir()?))
    }

    /// Creates a file-backed cache with a specific root directory.
    pub fn with_dir(path: impl Into<PathBuf>) -> Self {
        Self::new(FsBackend::new(path))
    }

    /// Creates a process-local cache.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Sets entry limits.
    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the time source (for testing).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configured limits.
    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Disables caching. Stored data is kept.
    pub fn disable(&self) {
        self.state.lock().enabled = false;
    }

    /// Enables caching.
    pub fn enable(&self) {
        self.state.lock().enabled = true;
    }

    /// Returns whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Scans stored entries, dropping invalid ones, and returns the rest.
    ///
    /// Used to warm the icon store at startup. Returns nothing when disabled.
    pub fn load(&self) -> Vec<CacheEntry> {
        let mut state = self.state.lock();
        if !state.enabled {
            return Vec::new();
        }

        let entries = self.scan(&mut state);
        info!("Loaded {} cached icon sets", entries.len());
        entries
    }

    /// Reads a cached icon set.
    ///
    /// Missing, expired, corrupted and wrong-version entries read as `None`.
    pub fn read(&self, provider: &str, prefix: &str) -> Option<IconSetDocument> {
        let mut state = self.state.lock();
        if !state.enabled {
            return None;
        }
        self.ensure_scanned(&mut state);

        let key = cache_key(provider, prefix);
        self.read_entry(&mut state, &key).map(|entry| entry.data)
    }

    /// Stores an icon set.
    ///
    /// Icons merge into an existing entry with the same `lastModified`;
    /// a newer `lastModified` replaces the entry and an older one is ignored.
    /// Evicts the oldest entries once the entry limit is exceeded.
    pub fn write(&self, provider: &str, prefix: &str, document: &IconSetDocument) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        self.ensure_scanned(&mut state);

        let key = cache_key(provider, prefix);
        let data = match self.read_entry(&mut state, &key) {
            Some(existing) if existing.data.last_modified == document.last_modified => {
                merge_documents(existing.data, document)
            }
            Some(existing) if is_older(document.last_modified, existing.data.last_modified) => {
                debug!("Ignoring outdated icon set for {}:{}", provider, prefix);
                return;
            }
            Some(_) => {
                debug!("Replacing stale cache entry for {}:{}", provider, prefix);
                document.clone()
            }
            None => document.clone(),
        };

        let now = (self.clock)();
        let entry = CacheEntry::new(provider, prefix, data, now);
        let result = serde_json::to_string(&entry)
            .map_err(CacheError::from)
            .and_then(|content| self.backend.write(&key, &content));

        match result {
            Ok(()) => {
                state.index.insert(key, now);
                self.evict(&mut state);
            }
            Err(e) => warn!("Failed to cache {}:{}: {}", provider, prefix, e),
        }
    }

    /// Removes the entry for `(provider, prefix)`.
    pub fn remove(&self, provider: &str, prefix: &str) {
        let mut state = self.state.lock();
        let key = cache_key(provider, prefix);
        self.remove_key(&mut state, &key);
    }

    /// Removes every stored entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        match self.backend.keys() {
            Ok(keys) => {
                for key in keys {
                    self.remove_key(&mut state, &key);
                }
            }
            Err(e) => warn!("Failed to list cache entries: {}", e),
        }
        state.index.clear();
    }

    /// Returns the number of valid stored entries.
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        self.ensure_scanned(&mut state);
        state.index.len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_scanned(&self, state: &mut CacheState) {
        if !state.scanned {
            self.scan(state);
        }
    }

    fn scan(&self, state: &mut CacheState) -> Vec<CacheEntry> {
        state.scanned = true;
        state.index.clear();

        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list cache entries: {}", e);
                return Vec::new();
            }
        };

        let mut entries: Vec<CacheEntry> = keys
            .iter()
            .filter_map(|key| self.read_entry(state, key))
            .collect();

        self.evict(state);
        entries.retain(|entry| {
            state
                .index
                .contains_key(&cache_key(&entry.provider, &entry.prefix))
        });
        entries
    }

    /// Reads and validates one entry, removing it from storage if invalid.
    fn read_entry(&self, state: &mut CacheState, key: &str) -> Option<CacheEntry> {
        let content = match self.backend.read(key) {
            Ok(Some(content)) => content,
            Ok(None) => {
                state.index.remove(key);
                return None;
            }
            Err(e) => {
                debug!("Failed to read cache entry {}: {}", key, e);
                return None;
            }
        };

        let entry = match CacheEntry::parse(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Dropping cache entry {}: {}", key, e);
                self.remove_key(state, key);
                return None;
            }
        };

        if cache_key(&entry.provider, &entry.prefix) != key
            || !entry.is_valid((self.clock)(), self.options.max_age)
        {
            debug!("Dropping outdated cache entry {}", key);
            self.remove_key(state, key);
            return None;
        }

        state.index.insert(key.to_string(), entry.cached);
        Some(entry)
    }

    fn remove_key(&self, state: &mut CacheState, key: &str) {
        state.index.remove(key);
        if let Err(e) = self.backend.remove(key) {
            debug!("Failed to remove cache entry {}: {}", key, e);
        }
    }

    fn evict(&self, state: &mut CacheState) {
        while state.index.len() > self.options.max_entries {
            let Some(oldest) = state
                .index
                .iter()
                .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!("Evicting cache entry {}", oldest);
            self.remove_key(state, &oldest);
        }
    }
}

/// True when both timestamps are known and `incoming` predates `current`.
pub fn is_older(incoming: Option<u64>, current: Option<u64>) -> bool {
    matches!((incoming, current), (Some(incoming), Some(current)) if incoming < current)
}

/// Storage key for `(provider, prefix)`.
pub fn cache_key(provider: &str, prefix: &str) -> String {
    let raw = format!("{provider}\0{prefix}");
    blake3::hash(raw.as_bytes()).to_hex().to_string()
}

/// Platform cache directory for icon sets.
pub fn default_cache_dir() -> Result<PathBuf, CacheError> {
    let base_dir = dirs::cache_dir().ok_or(CacheError::DirResolutionFailed)?;
    Ok(base_dir.join("iconkit").join("icons"))
}

fn merge_documents(mut base: IconSetDocument, update: &IconSetDocument) -> IconSetDocument {
    for (name, icon) in &update.icons {
        base.aliases.remove(name);
        base.icons.insert(name.clone(), icon.clone());
    }
    for (name, alias) in &update.aliases {
        base.icons.remove(name);
        base.aliases.insert(name.clone(), alias.clone());
    }
    base.not_found
        .retain(|name| !update.icons.contains_key(name) && !update.aliases.contains_key(name));
    for name in &update.not_found {
        if !base.not_found.contains(name) {
            base.not_found.push(name.clone());
        }
    }
    base.defaults = update.defaults.clone();
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::tempdir;

    fn manual_clock(start: u64) -> (Arc<AtomicU64>, Clock) {
        let time = Arc::new(AtomicU64::new(start));
        let handle = Arc::clone(&time);
        let clock: Clock = Arc::new(move || handle.load(Ordering::SeqCst));
        (time, clock)
    }

    fn document(prefix: &str, icon: &str) -> IconSetDocument {
        IconSetDocument::new(prefix).with_icon(icon, format!("<path id=\"{icon}\"/>"))
    }

    struct FailingBackend;

    fn quota_exceeded() -> CacheError {
        std::io::Error::other("quota exceeded").into()
    }

    impl CacheBackend for FailingBackend {
        fn keys(&self) -> Result<Vec<String>, CacheError> {
            Err(quota_exceeded())
        }
        fn read(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(quota_exceeded())
        }
        fn write(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(quota_exceeded())
        }
        fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Err(quota_exceeded())
        }
    }

    #[test]
    fn test_cache_new() {
        let cache = PersistentCache::in_memory();
        assert!(cache.is_enabled());
        assert!(cache.is_empty());
        assert_eq!(cache.options(), CacheOptions::default());
    }

    #[test]
    fn test_write_and_read() {
        let cache = PersistentCache::in_memory();
        let doc = document("mdi", "home");

        cache.write("", "mdi", &doc);

        assert_eq!(cache.read("", "mdi"), Some(doc));
        assert!(cache.read("other", "mdi").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disable_preserves_data() {
        let cache = PersistentCache::in_memory();
        let doc = document("mdi", "home");
        cache.write("", "mdi", &doc);

        cache.disable();
        assert!(cache.read("", "mdi").is_none());
        cache.write("", "fa", &document("fa", "star"));

        cache.enable();
        assert_eq!(cache.read("", "mdi"), Some(doc));
        assert!(cache.read("", "fa").is_none());
    }

    #[test]
    fn test_stale_version_reads_as_absent() {
        let temp_dir = tempdir().unwrap();
        let backend = FsBackend::new(temp_dir.path());
        let mut entry = CacheEntry::new("", "mdi", document("mdi", "home"), now_millis());
        entry.version = "iconkit-cache-v1".to_string();
        backend
            .write(&cache_key("", "mdi"), &serde_json::to_string(&entry).unwrap())
            .unwrap();

        let cache = PersistentCache::with_dir(temp_dir.path());
        assert!(cache.read("", "mdi").is_none());
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let (time, clock) = manual_clock(1_000);
        let cache = PersistentCache::in_memory()
            .with_options(CacheOptions {
                max_entries: 10,
                max_age: Duration::from_secs(60),
            })
            .with_clock(clock);

        cache.write("", "mdi", &document("mdi", "home"));
        time.store(1_000 + 59_000, Ordering::SeqCst);
        assert!(cache.read("", "mdi").is_some());

        time.store(1_000 + 61_000, Ordering::SeqCst);
        assert!(cache.read("", "mdi").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_skips_expired_and_wrong_version_entries() {
        let temp_dir = tempdir().unwrap();
        let backend = FsBackend::new(temp_dir.path());
        let hour = 60 * 60 * 1000;
        let now = 10 * hour;
        let put = |entry: &CacheEntry| {
            backend
                .write(
                    &cache_key(&entry.provider, &entry.prefix),
                    &serde_json::to_string(entry).unwrap(),
                )
                .unwrap();
        };

        put(&CacheEntry::new("", "fresh", document("fresh", "a"), now - 1_000));
        put(&CacheEntry::new("", "expired", document("expired", "a"), now - 2 * hour));
        let mut legacy = CacheEntry::new("", "legacy", document("legacy", "a"), now);
        legacy.version = "iconkit-cache-v1".to_string();
        put(&legacy);

        let (_time, clock) = manual_clock(now);
        let cache = PersistentCache::with_dir(temp_dir.path())
            .with_options(CacheOptions {
                max_entries: 10,
                max_age: Duration::from_secs(60 * 60),
            })
            .with_clock(clock);

        let loaded: Vec<String> = cache.load().into_iter().map(|entry| entry.prefix).collect();
        assert_eq!(loaded, vec!["fresh".to_string()]);
        assert_eq!(backend.keys().unwrap(), vec![cache_key("", "fresh")]);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let (time, clock) = manual_clock(1_000);
        let cache = PersistentCache::in_memory()
            .with_options(CacheOptions {
                max_entries: 2,
                max_age: DEFAULT_MAX_AGE,
            })
            .with_clock(clock);

        for (i, prefix) in ["a", "b", "c"].iter().enumerate() {
            time.store(1_000 + i as u64, Ordering::SeqCst);
            cache.write("", prefix, &document(prefix, "icon"));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.read("", "a").is_none());
        assert!(cache.read("", "b").is_some());
        assert!(cache.read("", "c").is_some());
    }

    #[test]
    fn test_rewrite_refreshes_timestamp() {
        let (time, clock) = manual_clock(1_000);
        let cache = PersistentCache::in_memory()
            .with_options(CacheOptions {
                max_entries: 2,
                max_age: DEFAULT_MAX_AGE,
            })
            .with_clock(clock);

        cache.write("", "a", &document("a", "one"));
        time.store(2_000, Ordering::SeqCst);
        cache.write("", "b", &document("b", "one"));
        time.store(3_000, Ordering::SeqCst);
        cache.write("", "a", &document("a", "two"));
        time.store(4_000, Ordering::SeqCst);
        cache.write("", "c", &document("c", "one"));

        assert!(cache.read("", "a").is_some());
        assert!(cache.read("", "b").is_none());
    }

    #[test]
    fn test_write_merges_same_last_modified() {
        let cache = PersistentCache::in_memory();
        cache.write("", "mdi", &document("mdi", "home"));
        cache.write("", "mdi", &document("mdi", "account"));

        let stored = cache.read("", "mdi").unwrap();
        assert_eq!(
            stored.icons.keys().collect::<Vec<_>>(),
            vec!["account", "home"]
        );
    }

    #[test]
    fn test_write_replaces_on_new_last_modified() {
        let cache = PersistentCache::in_memory();
        let mut old = document("mdi", "home");
        old.last_modified = Some(100);
        cache.write("", "mdi", &old);

        let mut new = document("mdi", "account");
        new.last_modified = Some(200);
        cache.write("", "mdi", &new);

        assert_eq!(cache.read("", "mdi"), Some(new));
    }

    #[test]
    fn test_write_keeps_newer_entry() {
        let cache = PersistentCache::in_memory();
        let mut newer = document("mdi", "account");
        newer.last_modified = Some(200);
        cache.write("", "mdi", &newer);

        let mut older = document("mdi", "home");
        older.last_modified = Some(100);
        cache.write("", "mdi", &older);

        assert_eq!(cache.read("", "mdi"), Some(newer));
    }

    #[rstest::rstest]
    #[case(Some(100), Some(200), true)]
    #[case(Some(200), Some(100), false)]
    #[case(Some(100), Some(100), false)]
    #[case(None, Some(100), false)]
    #[case(Some(100), None, false)]
    fn test_is_older(
        #[case] incoming: Option<u64>,
        #[case] current: Option<u64>,
        #[case] expected: bool,
    ) {
        assert_eq!(is_older(incoming, current), expected);
    }

    #[test]
    fn test_load_returns_valid_entries_and_drops_corrupted() {
        let temp_dir = tempdir().unwrap();
        {
            let cache = PersistentCache::with_dir(temp_dir.path());
            cache.write("", "mdi", &document("mdi", "home"));
            cache.write("custom", "fa", &document("fa", "star"));
        }
        std::fs::write(temp_dir.path().join("garbage.json"), "{ nope").unwrap();

        let cache = PersistentCache::with_dir(temp_dir.path());
        let mut loaded: Vec<_> = cache
            .load()
            .into_iter()
            .map(|entry| (entry.provider, entry.prefix))
            .collect();
        loaded.sort();

        assert_eq!(
            loaded,
            vec![
                ("".to_string(), "mdi".to_string()),
                ("custom".to_string(), "fa".to_string())
            ]
        );
        assert!(!temp_dir.path().join("garbage.json").exists());
    }

    #[test]
    fn test_load_when_disabled_returns_nothing() {
        let cache = PersistentCache::in_memory();
        cache.write("", "mdi", &document("mdi", "home"));
        cache.disable();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_storage_errors_are_swallowed() {
        let cache = PersistentCache::new(FailingBackend);
        cache.write("", "mdi", &document("mdi", "home"));
        assert!(cache.read("", "mdi").is_none());
        assert!(cache.load().is_empty());
        cache.remove("", "mdi");
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = PersistentCache::in_memory();
        cache.write("", "mdi", &document("mdi", "home"));
        cache.write("", "fa", &document("fa", "star"));

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.read("", "mdi").is_none());
    }

    #[rstest::rstest]
    #[case("../evil", "mdi")]
    #[case("", "mdi")]
    #[case("custom", "fa-solid")]
    fn test_cache_key_is_filesystem_safe(#[case] provider: &str, #[case] prefix: &str) {
        let key = cache_key(provider, prefix);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cache_key_separates_provider_and_prefix() {
        assert_ne!(cache_key("a", "bc"), cache_key("ab", "c"));
        assert_ne!(cache_key("../evil", "mdi"), cache_key("", "mdi"));
    }
}
