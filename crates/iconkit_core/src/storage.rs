//! In-memory icon storage.
//!
//! Icons are grouped by (provider, prefix). Each group holds resolved icon
//! data and a record of names that failed to load. Aliases are resolved when
//! an icon set is added, so lookups never walk parent chains.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use iconkit_types::{IconData, IconName, IconSetDocument, is_valid_segment};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

/// Identifies one icon set: (provider, prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetKey {
    pub provider: String,
    pub prefix: String,
}

impl SetKey {
    pub fn new(provider: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            prefix: prefix.into(),
        }
    }

    /// Key of the set `name` belongs to.
    pub fn of(name: &IconName) -> Self {
        Self::new(name.provider.clone(), name.prefix.clone())
    }

    /// Builds a name inside this set.
    pub fn icon(&self, name: impl Into<String>) -> IconName {
        IconName::new(self.provider.clone(), self.prefix.clone(), name)
    }
}

impl fmt::Display for SetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.provider.is_empty() {
            write!(f, "{}", self.prefix)
        } else {
            write!(f, "@{}:{}", self.provider, self.prefix)
        }
    }
}

/// Why an icon is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The provider reported the icon or its set as nonexistent.
    NotFound,
    /// No host could be reached or every host returned garbage.
    Unavailable,
}

/// Failure history of one missing icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub attempts: u32,
    pub failed_at: Instant,
}

/// Lookup result for a single name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconStatus {
    Available,
    Missing,
    Unknown,
}

#[derive(Debug, Default)]
struct IconSetStorage {
    icons: HashMap<String, Arc<IconData>>,
    missing: HashMap<String, FailureRecord>,
    last_modified: Option<u64>,
}

/// Registry of resolved icons and known failures.
#[derive(Debug, Default)]
pub struct IconStore {
    sets: RwLock<HashMap<SetKey, IconSetStorage>>,
    simple_names: AtomicBool,
}

impl IconStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows or forbids icons with an empty prefix.
    pub fn allow_simple_names(&self, allow: bool) {
        self.simple_names.store(allow, Ordering::Relaxed);
    }

    pub fn simple_names(&self) -> bool {
        self.simple_names.load(Ordering::Relaxed)
    }

    pub fn has_icon(&self, name: &IconName) -> bool {
        self.sets
            .read()
            .get(&SetKey::of(name))
            .is_some_and(|set| set.icons.contains_key(&name.name))
    }

    pub fn get_icon(&self, name: &IconName) -> Option<Arc<IconData>> {
        self.sets
            .read()
            .get(&SetKey::of(name))
            .and_then(|set| set.icons.get(&name.name).cloned())
    }

    pub fn status(&self, name: &IconName) -> IconStatus {
        let sets = self.sets.read();
        let Some(set) = sets.get(&SetKey::of(name)) else {
            return IconStatus::Unknown;
        };
        if set.icons.contains_key(&name.name) {
            IconStatus::Available
        } else if set.missing.contains_key(&name.name) {
            IconStatus::Missing
        } else {
            IconStatus::Unknown
        }
    }

    /// Failure record of a missing icon.
    pub fn failure(&self, name: &IconName) -> Option<FailureRecord> {
        self.sets
            .read()
            .get(&SetKey::of(name))
            .and_then(|set| set.missing.get(&name.name).copied())
    }

    /// Returns true if `name` is missing and the policy allows another attempt.
    pub fn is_retryable(&self, name: &IconName, policy: &RetryPolicy, now: Instant) -> bool {
        self.failure(name)
            .is_some_and(|record| policy.allows_retry(&record, now))
    }

    /// Returns true if `name` should be requested from a source.
    pub fn needs_load(&self, name: &IconName, policy: &RetryPolicy, now: Instant) -> bool {
        match self.status(name) {
            IconStatus::Available => false,
            IconStatus::Unknown => true,
            IconStatus::Missing => self.is_retryable(name, policy, now),
        }
    }

    /// Adds a single icon. Returns false for invalid names.
    pub fn add_icon(&self, name: &IconName, data: IconData) -> bool {
        if !name.is_valid(self.simple_names()) {
            warn!("Refusing to add icon with invalid name {:?}", name.to_string());
            return false;
        }

        let mut sets = self.sets.write();
        let set = sets.entry(SetKey::of(name)).or_default();
        set.missing.remove(&name.name);
        set.icons.insert(name.name.clone(), Arc::new(data));
        true
    }

    /// Adds every valid icon and alias of a document.
    ///
    /// The document's own `provider` wins over `provider`. Names listed in
    /// `not_found` are recorded as missing. Returns the number of icons added.
    pub fn add_icon_set(&self, provider: &str, document: &IconSetDocument) -> usize {
        let provider = document.provider.as_deref().unwrap_or(provider);
        if (!provider.is_empty() && !is_valid_segment(provider))
            || !is_valid_segment(&document.prefix)
        {
            warn!(
                "Refusing icon set with invalid provider {:?} or prefix {:?}",
                provider, document.prefix
            );
            return 0;
        }

        let resolved = document.resolve_icons();
        let key = SetKey::new(provider, document.prefix.clone());
        let now = Instant::now();

        let mut sets = self.sets.write();
        let set = sets.entry(key.clone()).or_default();

        let added = resolved.icons.len();
        for (name, data) in resolved.icons {
            set.missing.remove(&name);
            set.icons.insert(name, Arc::new(data));
        }

        for name in &document.not_found {
            if !set.icons.contains_key(name) {
                record_failure(set, name, FailureKind::NotFound, now);
            }
        }

        if let Some(last_modified) = document.last_modified
            && set.last_modified.is_none_or(|current| last_modified > current)
        {
            set.last_modified = Some(last_modified);
        }

        debug!("Added {} icons to {}", added, key);
        added
    }

    /// Records a failed attempt for every name that is still not available.
    pub fn mark_missing(&self, key: &SetKey, names: &[String], kind: FailureKind, now: Instant) {
        if names.is_empty() {
            return;
        }

        let mut sets = self.sets.write();
        let set = sets.entry(key.clone()).or_default();
        for name in names {
            if !set.icons.contains_key(name) {
                record_failure(set, name, kind, now);
            }
        }
    }

    /// Latest `lastModified` seen for an icon set.
    pub fn last_modified(&self, key: &SetKey) -> Option<u64> {
        self.sets.read().get(key).and_then(|set| set.last_modified)
    }

    /// Lists available icons, optionally filtered by provider and prefix.
    pub fn list_icons(&self, provider: Option<&str>, prefix: Option<&str>) -> Vec<IconName> {
        let sets = self.sets.read();
        let mut names: Vec<IconName> = sets
            .iter()
            .filter(|(key, _)| provider.is_none_or(|p| key.provider == p))
            .filter(|(key, _)| prefix.is_none_or(|p| key.prefix == p))
            .flat_map(|(key, set)| set.icons.keys().map(|name| key.icon(name.clone())))
            .collect();
        names.sort();
        names
    }

    /// Removes every icon and failure record.
    pub fn clear(&self) {
        self.sets.write().clear();
    }
}

fn record_failure(set: &mut IconSetStorage, name: &str, kind: FailureKind, now: Instant) {
    let attempts = set.missing.get(name).map_or(0, |record| record.attempts) + 1;
    set.missing.insert(
        name.to_string(),
        FailureRecord {
            kind,
            attempts,
            failed_at: now,
        },
    );
}
