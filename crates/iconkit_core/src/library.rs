//! Library facade.
//!
//! [`IconLibrary`] ties the icon store, the provider registry, the query
//! dispatcher, the cache tiers and the load coordinator together and accepts
//! icon names in their string forms.

use std::sync::{Arc, OnceLock};

use iconkit_api::{
    ApiConfigRegistry, ApiModule, DispatchError, PartialApiConfig, QueryDispatcher,
};
use iconkit_cache::{CacheKind, CacheTiers};
use iconkit_types::{IconData, IconName, IconSetDocument, NameError, is_valid_segment};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::LibraryConfig;
use crate::error::LoadError;
use crate::loader::{
    AbortHandle, CustomIconLoader, CustomIconsLoader, IconLoader, LoadResult, PendingLoad,
};
use crate::retry::RetryPolicy;
use crate::storage::IconStore;

static GLOBAL: OnceLock<IconLibrary> = OnceLock::new();

/// Process-wide library with default settings.
///
/// Built on first use; the persistent cache is loaded at that point.
pub fn global() -> &'static IconLibrary {
    GLOBAL.get_or_init(|| {
        let library = IconLibrary::new();
        library.init_cache();
        library
    })
}

/// Builder for [`IconLibrary`].
#[derive(Default)]
pub struct IconLibraryBuilder {
    config: LibraryConfig,
    module: Option<Arc<dyn ApiModule>>,
    cache: Option<CacheTiers>,
}

impl IconLibraryBuilder {
    pub fn config(mut self, config: LibraryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the HTTP module used for every provider.
    pub fn api_module(mut self, module: Arc<dyn ApiModule>) -> Self {
        self.module = Some(module);
        self
    }

    /// Uses the given cache tiers instead of building them from the config.
    pub fn cache(mut self, cache: CacheTiers) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> IconLibrary {
        let registry = Arc::new(ApiConfigRegistry::new());
        for (name, partial) in &self.config.providers {
            registry.add_provider(name, partial.clone());
        }

        let dispatcher = match self.module {
            Some(module) => QueryDispatcher::with_module(Arc::clone(&registry), module),
            None => QueryDispatcher::new(Arc::clone(&registry)),
        };
        let cache = self
            .cache
            .unwrap_or_else(|| self.config.cache.build(self.config.base_dir.as_deref()));

        let store = Arc::new(IconStore::new());
        store.allow_simple_names(self.config.simple_names);

        let loader = IconLoader::new(Arc::clone(&store), Arc::new(dispatcher), Arc::new(cache));
        loader.set_retry_policy(self.config.retry.policy());

        IconLibrary {
            store,
            registry,
            loader,
        }
    }
}

/// Icon data resolution and caching.
pub struct IconLibrary {
    store: Arc<IconStore>,
    registry: Arc<ApiConfigRegistry>,
    loader: IconLoader,
}

impl Default for IconLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl IconLibrary {
    /// Creates a library using the public API and the platform cache directory.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> IconLibraryBuilder {
        IconLibraryBuilder::default()
    }

    pub fn from_config(config: LibraryConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn store(&self) -> &Arc<IconStore> {
        &self.store
    }

    pub fn providers(&self) -> &Arc<ApiConfigRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &IconLoader {
        &self.loader
    }

    /// Parses a name using the current simple-name setting.
    pub fn parse_name(&self, name: &str) -> Result<IconName, NameError> {
        IconName::parse_with(name, self.store.simple_names(), "")
    }

    pub fn allow_simple_names(&self, allow: bool) {
        self.store.allow_simple_names(allow);
    }

    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        self.loader.set_retry_policy(policy);
    }

    /// Returns data of an icon that is already loaded.
    pub fn get_icon_data(&self, name: &str) -> Option<Arc<IconData>> {
        let name = self.parse_name(name).ok()?;
        self.store.get_icon(&name)
    }

    pub fn icon_loaded(&self, name: &str) -> bool {
        self.parse_name(name)
            .is_ok_and(|name| self.store.has_icon(&name))
    }

    /// Lists loaded icons, optionally filtered by provider and prefix.
    pub fn list_icons(&self, provider: Option<&str>, prefix: Option<&str>) -> Vec<IconName> {
        self.store.list_icons(provider, prefix)
    }

    /// Registers one icon. Returns false if the name is invalid.
    pub fn add_icon(&self, name: &str, data: IconData) -> bool {
        match self.parse_name(name) {
            Ok(name) => self.store.add_icon(&name, data),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Registers every valid icon of a document.
    ///
    /// Returns false if the document's provider or prefix is invalid.
    pub fn add_collection(&self, document: &IconSetDocument) -> bool {
        let provider = document.provider.as_deref().unwrap_or_default();
        if (!provider.is_empty() && !is_valid_segment(provider))
            || !is_valid_segment(&document.prefix)
        {
            warn!(
                "Invalid icon set provider {:?} or prefix {:?}",
                provider, document.prefix
            );
            return false;
        }
        self.store.add_icon_set(provider, document);
        true
    }

    /// Validates and registers an icon set given as JSON.
    pub fn add_collection_value(&self, value: Value) -> bool {
        match IconSetDocument::from_value(value) {
            Ok(document) => self.add_collection(&document),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Registers or replaces an API provider.
    pub fn add_api_provider(&self, name: &str, config: PartialApiConfig) -> bool {
        self.registry.add_provider(name, config)
    }

    /// Replaces the API module used for one provider.
    pub fn set_api_module(&self, provider: &str, module: Arc<dyn ApiModule>) {
        self.loader.dispatcher().set_module(provider, module);
    }

    /// Loads icons of one icon set through `loader` instead of the API.
    pub fn set_custom_icons_loader(
        &self,
        prefix: &str,
        provider: &str,
        loader: Arc<dyn CustomIconsLoader>,
    ) {
        self.loader.set_custom_loader(provider, prefix, loader);
    }

    /// Loads single icons of one icon set through `loader` instead of the API.
    pub fn set_custom_icon_loader(
        &self,
        prefix: &str,
        provider: &str,
        loader: Arc<dyn CustomIconLoader>,
    ) {
        self.loader.set_custom_icon_loader(provider, prefix, loader);
    }

    /// Sends a custom request to a provider's hosts and returns the JSON body.
    pub async fn send_api_query(&self, provider: &str, uri: &str) -> Result<Value, DispatchError> {
        self.loader
            .dispatcher()
            .send_custom_query(provider, uri)
            .await
    }

    pub fn enable_cache(&self, kind: CacheKind) {
        self.loader.cache().enable(kind);
    }

    pub fn disable_cache(&self, kind: CacheKind) {
        self.loader.cache().disable(kind);
    }

    /// Adds every valid persisted icon set to the store.
    ///
    /// Returns the number of icon sets loaded.
    pub fn init_cache(&self) -> usize {
        let entries = self.loader.cache().load();
        for entry in &entries {
            self.store.add_icon_set(&entry.provider, &entry.data);
        }
        if !entries.is_empty() {
            info!("Loaded {} icon sets from cache", entries.len());
        }
        entries.len()
    }

    /// Loads icons by name and calls `callback` once all are resolved.
    ///
    /// Invalid names are skipped.
    pub fn load_icons<S, F>(&self, names: &[S], callback: F) -> AbortHandle
    where
        S: AsRef<str>,
        F: FnOnce(LoadResult) + Send + 'static,
    {
        self.loader.load_icons(&self.parse_names(names), callback)
    }

    /// Loads icons by name. Dropping the returned future aborts the request.
    pub fn load<S: AsRef<str>>(&self, names: &[S]) -> PendingLoad {
        self.loader.load(&self.parse_names(names))
    }

    /// Loads one icon by name.
    pub async fn load_icon(&self, name: &str) -> Result<Arc<IconData>, LoadError> {
        let name = self.parse_name(name)?;
        self.loader.load_icon(&name).await
    }

    fn parse_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<IconName> {
        names
            .iter()
            .filter_map(|name| match self.parse_name(name.as_ref()) {
                Ok(name) => Some(name),
                Err(e) => {
                    debug!("Skipping icon: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Adds icon sets shipped with the host page or process.
    ///
    /// Accepts one icon set object or an array of them. Entries without an
    /// `icons` object and a `prefix` string, or that fail validation, are
    /// logged and skipped. Returns the number of icon sets added.
    pub fn add_preload(&self, payload: &Value) -> usize {
        let items: Vec<&Value> = match payload {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut added = 0;
        for item in items {
            let well_formed = item.get("icons").is_some_and(Value::is_object)
                && item.get("prefix").is_some_and(Value::is_string);
            if well_formed && self.add_collection_value(item.clone()) {
                added += 1;
            } else {
                error!("Invalid icon set preload syntax");
            }
        }
        added
    }

    /// Registers API providers from a name to config object.
    ///
    /// Entries without `resources` are ignored. Invalid configs are logged.
    /// Returns the number of providers registered.
    pub fn add_providers(&self, payload: &Value) -> usize {
        let Some(providers) = payload.as_object() else {
            error!("Invalid API provider payload: expected an object");
            return 0;
        };

        let mut added = 0;
        for (name, config) in providers {
            let has_resources = config
                .get("resources")
                .is_some_and(|resources| !resources.is_null());
            if !has_resources {
                continue;
            }
            if self.registry.add_provider_value(name, config) {
                added += 1;
            } else {
                error!("Invalid API provider config for {:?}", name);
            }
        }
        added
    }
}
