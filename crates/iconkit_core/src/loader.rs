//! Load coordination.
//!
//! Requests for icons that are not in the store are queued per icon set.
//! The first queued name schedules a batch task; every name queued before
//! that task runs joins the same batch. Names already in flight are never
//! requested twice: later requests wait for the running batch instead.
//! New names that arrive while a batch is running start another batch for
//! the same set, so one set may have several queries outstanding.
//!
//! Callbacks run on spawned tasks, never inside [`IconLoader::load_icons`].
//! A callback fires once, after every name of its request is either
//! available or known to be missing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use iconkit_api::{DispatchError, QueryDispatcher};
use iconkit_cache::{CacheTiers, is_older};
use iconkit_types::{IconData, IconName, IconSetDocument};
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::retry::RetryPolicy;
use crate::storage::{FailureKind, IconStore, SetKey};

/// Outcome of a load request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadResult {
    /// Requested names that are available.
    pub loaded: Vec<IconName>,
    /// Requested names that could not be loaded.
    pub missing: Vec<IconName>,
}

impl LoadResult {
    /// Returns true when nothing is missing.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Callback invoked once a request is resolved.
pub type LoadCallback = Box<dyn FnOnce(LoadResult) + Send + 'static>;

/// Loads icons of one icon set instead of the API.
#[async_trait]
pub trait CustomIconsLoader: Send + Sync {
    /// Returns a document with the icons that exist, or `None` if none do.
    async fn load_icons(
        &self,
        provider: &str,
        prefix: &str,
        icons: &[String],
    ) -> Option<IconSetDocument>;
}

/// Loads single icons of one icon set instead of the API.
///
/// Called once per requested name.
#[async_trait]
pub trait CustomIconLoader: Send + Sync {
    async fn load_icon(&self, name: &str, prefix: &str, provider: &str) -> Option<IconData>;
}

#[derive(Clone)]
enum CustomLoader {
    Set(Arc<dyn CustomIconsLoader>),
    Icon(Arc<dyn CustomIconLoader>),
}

struct PendingRequest {
    names: Vec<IconName>,
    waiting: HashSet<IconName>,
    callback: LoadCallback,
}

#[derive(Debug, Default)]
struct SetQueue {
    /// Names waiting for the next batch.
    queued: BTreeSet<String>,
    /// Names sent to a source and not yet resolved.
    in_flight: HashSet<String>,
    batch_scheduled: bool,
    /// Requests waiting on at least one name of this set.
    waiters: HashSet<u64>,
}

impl SetQueue {
    fn is_pending(&self, name: &str) -> bool {
        self.queued.contains(name) || self.in_flight.contains(name)
    }

    fn is_idle(&self) -> bool {
        self.queued.is_empty()
            && self.in_flight.is_empty()
            && !self.batch_scheduled
            && self.waiters.is_empty()
    }
}

#[derive(Default)]
struct LoaderState {
    next_id: u64,
    requests: HashMap<u64, PendingRequest>,
    queues: HashMap<SetKey, SetQueue>,
}

struct LoaderInner {
    store: Arc<IconStore>,
    dispatcher: Arc<QueryDispatcher>,
    cache: Arc<CacheTiers>,
    custom_loaders: RwLock<HashMap<SetKey, CustomLoader>>,
    retry: RwLock<RetryPolicy>,
    state: Mutex<LoaderState>,
}

/// Coordinates icon loading across the store, the cache and the API.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct IconLoader {
    inner: Arc<LoaderInner>,
}

impl IconLoader {
    pub fn new(
        store: Arc<IconStore>,
        dispatcher: Arc<QueryDispatcher>,
        cache: Arc<CacheTiers>,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                store,
                dispatcher,
                cache,
                custom_loaders: RwLock::new(HashMap::new()),
                retry: RwLock::new(RetryPolicy::default()),
                state: Mutex::new(LoaderState::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<IconStore> {
        &self.inner.store
    }

    pub fn dispatcher(&self) -> &Arc<QueryDispatcher> {
        &self.inner.dispatcher
    }

    pub fn cache(&self) -> &Arc<CacheTiers> {
        &self.inner.cache
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        *self.inner.retry.read()
    }

    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        *self.inner.retry.write() = policy;
    }

    /// Routes requests for one icon set to `loader` instead of the API.
    ///
    /// Replaces any custom loader registered for the same set.
    pub fn set_custom_loader(
        &self,
        provider: &str,
        prefix: &str,
        loader: Arc<dyn CustomIconsLoader>,
    ) {
        self.inner
            .custom_loaders
            .write()
            .insert(SetKey::new(provider, prefix), CustomLoader::Set(loader));
    }

    /// Routes requests for one icon set to a per-icon `loader`.
    ///
    /// Replaces any custom loader registered for the same set.
    pub fn set_custom_icon_loader(
        &self,
        provider: &str,
        prefix: &str,
        loader: Arc<dyn CustomIconLoader>,
    ) {
        self.inner
            .custom_loaders
            .write()
            .insert(SetKey::new(provider, prefix), CustomLoader::Icon(loader));
    }

    /// Number of requests whose callback has not fired yet.
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().requests.len()
    }

    /// Requests `names` and calls `callback` once all of them are resolved.
    ///
    /// Must be called within a Tokio runtime.
    pub fn load_icons<F>(&self, names: &[IconName], callback: F) -> AbortHandle
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        let names = dedupe(names);
        let policy = self.retry_policy();
        let now = Instant::now();
        let mut schedule = Vec::new();

        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        let mut waiting = HashSet::new();
        for name in &names {
            // Names without a prefix can only come from local registration
            if name.prefix.is_empty()
                || !name.is_valid(false)
                || !self.inner.store.needs_load(name, &policy, now)
            {
                continue;
            }

            let key = SetKey::of(name);
            let queue = state.queues.entry(key.clone()).or_default();
            queue.waiters.insert(id);
            waiting.insert(name.clone());

            if queue.is_pending(&name.name) {
                continue;
            }
            queue.queued.insert(name.name.clone());
            if !queue.batch_scheduled {
                queue.batch_scheduled = true;
                schedule.push(key);
            }
        }

        let ready = waiting.is_empty();
        state.requests.insert(
            id,
            PendingRequest {
                names,
                waiting,
                callback: Box::new(callback),
            },
        );
        drop(state);

        if ready {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.complete_ready(id) });
        }
        for key in schedule {
            debug!("Scheduling batch for {}", key);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_batch(key).await });
        }

        AbortHandle {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Requests `names` and returns a future resolving to the result.
    ///
    /// Dropping the future before it completes aborts the request.
    pub fn load(&self, names: &[IconName]) -> PendingLoad {
        let (sender, receiver) = oneshot::channel();
        let handle = self.load_icons(names, move |result| {
            let _ = sender.send(result);
        });

        PendingLoad {
            receiver,
            handle,
            names: dedupe(names),
            finished: false,
        }
    }

    /// Loads a single icon and returns its data.
    pub async fn load_icon(&self, name: &IconName) -> Result<Arc<IconData>, LoadError> {
        if let Some(data) = self.inner.store.get_icon(name) {
            return Ok(data);
        }

        self.load(std::slice::from_ref(name)).await;
        self.inner
            .store
            .get_icon(name)
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}

impl LoaderInner {
    fn complete_ready(&self, id: u64) {
        let request = {
            let mut state = self.state.lock();
            let ready = state
                .requests
                .get(&id)
                .is_some_and(|request| request.waiting.is_empty());
            if ready { state.requests.remove(&id) } else { None }
        };
        if let Some(request) = request {
            self.fire(request);
        }
    }

    async fn run_batch(self: Arc<Self>, key: SetKey) {
        let names: Vec<String> = {
            let mut state = self.state.lock();
            let Some(queue) = state.queues.get_mut(&key) else {
                return;
            };
            queue.batch_scheduled = false;
            let names: Vec<String> = std::mem::take(&mut queue.queued).into_iter().collect();
            queue.in_flight.extend(names.iter().cloned());
            names
        };
        if names.is_empty() {
            return;
        }

        let policy = *self.retry.read();
        let mut remaining = names.clone();

        if let Some(document) = self.read_cache(&key) {
            self.store.add_icon_set(&key.provider, &document);
            let now = Instant::now();
            let (pending, cached): (Vec<String>, Vec<String>) = names
                .into_iter()
                .partition(|name| self.store.needs_load(&key.icon(name.clone()), &policy, now));
            debug!("{} icons of {} found in persistent cache", cached.len(), key);
            self.finish(&key, &cached);
            remaining = pending;
        }
        if remaining.is_empty() {
            return;
        }

        let custom = self.custom_loaders.read().get(&key).cloned();
        match custom {
            Some(CustomLoader::Set(loader)) => {
                debug!("Loading {} icons of {} with custom loader", remaining.len(), key);
                match loader
                    .load_icons(&key.provider, &key.prefix, &remaining)
                    .await
                {
                    Some(document) => self.apply_document(&key, &remaining, &document, false),
                    None => self.record_failure(&key, &remaining, FailureKind::NotFound),
                }
                self.finish(&key, &remaining);
            }
            Some(CustomLoader::Icon(loader)) => {
                debug!("Loading {} icons of {} one by one", remaining.len(), key);
                let loaded = join_all(remaining.iter().map(|name| {
                    let loader = Arc::clone(&loader);
                    let key = &key;
                    async move {
                        let data = loader.load_icon(name, &key.prefix, &key.provider).await;
                        (name, data)
                    }
                }))
                .await;
                for (name, data) in loaded {
                    match data {
                        Some(data) => {
                            self.store.add_icon(&key.icon(name.clone()), data);
                        }
                        None => self.record_failure(
                            &key,
                            std::slice::from_ref(name),
                            FailureKind::NotFound,
                        ),
                    }
                }
                self.finish(&key, &remaining);
            }
            None => self.fetch_from_api(&key, &remaining).await,
        }
    }

    async fn fetch_from_api(&self, key: &SetKey, names: &[String]) {
        let results = match self
            .dispatcher
            .fetch(&key.provider, &key.prefix, names)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Cannot load icons of {}: {}", key, e);
                self.record_failure(key, names, failure_kind(&e));
                self.finish(key, names);
                return;
            }
        };

        let mut covered = HashSet::new();
        for (query, result) in results {
            match result {
                Ok(document) => self.apply_document(key, &query.icons, &document, true),
                Err(e) => {
                    debug!("Query {} failed: {}", query.uri, e);
                    self.record_failure(key, &query.icons, failure_kind(&e));
                }
            }
            self.finish(key, &query.icons);
            covered.extend(query.icons);
        }

        let dropped: Vec<String> = names
            .iter()
            .filter(|name| !covered.contains(*name))
            .cloned()
            .collect();
        if !dropped.is_empty() {
            warn!("{} icons of {} were not included in any query", dropped.len(), key);
            self.record_failure(key, &dropped, FailureKind::Unavailable);
            self.finish(key, &dropped);
        }
    }

    /// Reads a cached icon set unless the store has seen a newer version.
    ///
    /// Outdated entries are removed from the cache.
    fn read_cache(&self, key: &SetKey) -> Option<IconSetDocument> {
        let document = self.cache.read(&key.provider, &key.prefix)?;
        if is_older(document.last_modified, self.store.last_modified(key)) {
            debug!("Dropping outdated cache entry for {}", key);
            self.cache.remove(&key.provider, &key.prefix);
            return None;
        }
        Some(document)
    }

    /// Stores a fetched document and marks requested names it lacks as missing.
    fn apply_document(
        &self,
        key: &SetKey,
        names: &[String],
        document: &IconSetDocument,
        persist: bool,
    ) {
        let foreign_provider = document
            .provider
            .as_deref()
            .is_some_and(|provider| provider != key.provider);
        if document.prefix != key.prefix || foreign_provider {
            warn!(
                "Ignoring icon set {:?} returned for {}",
                document.prefix, key
            );
            self.record_failure(key, names, FailureKind::Unavailable);
            return;
        }

        self.store.add_icon_set(&key.provider, document);
        if persist && !(document.is_empty() && document.not_found.is_empty()) {
            self.cache.write(&key.provider, &key.prefix, document);
        }
        self.record_failure(key, names, FailureKind::NotFound);
    }

    fn record_failure(&self, key: &SetKey, names: &[String], kind: FailureKind) {
        // mark_missing skips names that are available
        self.store.mark_missing(key, names, kind, Instant::now());
    }

    /// Clears `names` from the in-flight set and fires completed requests.
    fn finish(&self, key: &SetKey, names: &[String]) {
        if names.is_empty() {
            return;
        }

        let completed = {
            let mut state = self.state.lock();
            let LoaderState {
                requests, queues, ..
            } = &mut *state;

            let Some(queue) = queues.get_mut(key) else {
                return;
            };
            for name in names {
                queue.in_flight.remove(name);
            }

            let mut done = Vec::new();
            for id in &queue.waiters {
                let Some(request) = requests.get_mut(id) else {
                    continue;
                };
                request
                    .waiting
                    .retain(|name| SetKey::of(name) != *key || queue.is_pending(&name.name));
                if request.waiting.is_empty() {
                    done.push(*id);
                }
            }

            let mut completed = Vec::with_capacity(done.len());
            for id in done {
                if let Some(request) = requests.remove(&id) {
                    for name in &request.names {
                        if let Some(queue) = queues.get_mut(&SetKey::of(name)) {
                            queue.waiters.remove(&id);
                        }
                    }
                    completed.push(request);
                }
            }
            queues.retain(|_, queue| !queue.is_idle());
            completed
        };

        for request in completed {
            self.fire(request);
        }
    }

    fn fire(&self, request: PendingRequest) {
        let (loaded, missing) = request
            .names
            .into_iter()
            .partition(|name| self.store.has_icon(name));
        (request.callback)(LoadResult { loaded, missing });
    }
}

fn failure_kind(error: &DispatchError) -> FailureKind {
    if error.is_permanent() {
        FailureKind::NotFound
    } else {
        FailureKind::Unavailable
    }
}

fn dedupe(names: &[IconName]) -> Vec<IconName> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(*name))
        .cloned()
        .collect()
}

/// Cancels the callback of a load request.
///
/// Aborting does not stop network requests that are already running; their
/// results are still stored.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    inner: Weak<LoaderInner>,
    id: u64,
}

impl AbortHandle {
    /// Detaches the request. Safe to call more than once.
    pub fn abort(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let mut state = inner.state.lock();
        let LoaderState {
            requests, queues, ..
        } = &mut *state;

        if let Some(request) = requests.remove(&self.id) {
            for name in &request.waiting {
                if let Some(queue) = queues.get_mut(&SetKey::of(name)) {
                    queue.waiters.remove(&self.id);
                }
            }
            queues.retain(|_, queue| !queue.is_idle());
            debug!("Aborted load request {}", self.id);
        }
    }
}

/// Future returned by [`IconLoader::load`].
pub struct PendingLoad {
    receiver: oneshot::Receiver<LoadResult>,
    handle: AbortHandle,
    names: Vec<IconName>,
    finished: bool,
}

impl PendingLoad {
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.handle
    }
}

impl Future for PendingLoad {
    type Output = LoadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LoadResult> {
        let this = &mut *self;
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(result) => {
                this.finished = true;
                // The sender is only dropped unsent when the loader goes away
                Poll::Ready(result.unwrap_or_else(|_| LoadResult {
                    loaded: Vec::new(),
                    missing: std::mem::take(&mut this.names),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        if !self.finished {
            self.handle.abort();
        }
    }
}
