//! API provider configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use iconkit_types::is_valid_segment;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;

/// Hosts of the public icon API, used by the default provider.
pub const PUBLIC_API_HOSTS: [&str; 3] = [
    "https://api.iconify.design",
    "https://api.simplesvg.com",
    "https://api.unisvg.com",
];

/// Default maximum URL length for a single query.
pub const DEFAULT_MAX_URL: usize = 500;

/// Default timeout for a single host request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// One host or a list of hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resources {
    Single(String),
    List(Vec<String>),
}

/// Provider configuration as supplied by users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, rename = "maxURL", skip_serializing_if = "Option::is_none")]
    pub max_url: Option<usize>,
    /// Per-host timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl PartialApiConfig {
    /// Creates a partial config listing `hosts`.
    pub fn with_resources<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: Some(Resources::List(hosts.into_iter().map(Into::into).collect())),
            ..Default::default()
        }
    }
}

/// Validated provider configuration.
///
/// The rotation start index is shared state: the dispatcher moves it to the
/// last host that answered so later queries try that host first.
#[derive(Debug)]
pub struct ApiConfig {
    resources: Vec<String>,
    path: String,
    max_url: usize,
    timeout: Duration,
    index: AtomicUsize,
}

impl ApiConfig {
    /// Validates a partial config.
    pub fn from_partial(partial: PartialApiConfig) -> Result<Self, ApiError> {
        let resources = match partial.resources {
            Some(Resources::Single(host)) => vec![host],
            Some(Resources::List(hosts)) => hosts,
            None => {
                return Err(ApiError::InvalidConfig(
                    "missing `resources`".to_string(),
                ));
            }
        };

        if resources.is_empty() {
            return Err(ApiError::InvalidConfig("empty `resources`".to_string()));
        }

        let resources = resources
            .into_iter()
            .map(|host| validate_host(&host))
            .collect::<Result<Vec<_>, _>>()?;

        let path = partial.path.unwrap_or_else(|| "/".to_string());
        if !path.starts_with('/') {
            return Err(ApiError::InvalidConfig(format!(
                "`path` must start with '/': {path}"
            )));
        }

        let max_url = partial.max_url.unwrap_or(DEFAULT_MAX_URL);
        if max_url == 0 {
            return Err(ApiError::InvalidConfig("`maxURL` must be positive".to_string()));
        }

        let timeout = partial
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let index = partial.index.unwrap_or(0) % resources.len();

        Ok(Self {
            resources,
            path,
            max_url,
            timeout,
            index: AtomicUsize::new(index),
        })
    }

    /// Configuration of the public API.
    pub fn public() -> Self {
        Self {
            resources: PUBLIC_API_HOSTS.iter().map(|h| h.to_string()).collect(),
            path: "/".to_string(),
            max_url: DEFAULT_MAX_URL,
            timeout: DEFAULT_TIMEOUT,
            index: AtomicUsize::new(0),
        }
    }

    /// Candidate hosts in configuration order.
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Request path prefix, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Maximum URL length for a single query.
    pub fn max_url(&self) -> usize {
        self.max_url
    }

    /// Timeout for a single host request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Index of the host tried first.
    pub fn start_index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// Moves the rotation start to `index`.
    pub fn set_start_index(&self, index: usize) {
        self.index
            .store(index % self.resources.len(), Ordering::Relaxed);
    }
}

fn validate_host(host: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(host)
        .map_err(|e| ApiError::InvalidConfig(format!("invalid host {host:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidConfig(format!(
            "unsupported scheme for host {host:?}"
        )));
    }

    Ok(host.trim_end_matches('/').to_string())
}

/// Registry of API providers by name.
#[derive(Debug)]
pub struct ApiConfigRegistry {
    configs: RwLock<HashMap<String, Arc<ApiConfig>>>,
}

impl Default for ApiConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiConfigRegistry {
    /// Creates a registry with the public API registered as provider `""`.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry
            .configs
            .write()
            .insert(String::new(), Arc::new(ApiConfig::public()));
        registry
    }

    /// Creates a registry without any provider.
    pub fn empty() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Registers or replaces a provider.
    ///
    /// Returns false for malformed configs instead of failing, so one bad
    /// provider does not prevent others from loading.
    pub fn add_provider(&self, name: &str, partial: PartialApiConfig) -> bool {
        if !name.is_empty() && !is_valid_segment(name) {
            warn!("{}", ApiError::InvalidProvider(name.to_string()));
            return false;
        }

        match ApiConfig::from_partial(partial) {
            Ok(config) => {
                debug!("Registered API provider {:?}", name);
                self.configs
                    .write()
                    .insert(name.to_string(), Arc::new(config));
                true
            }
            Err(e) => {
                warn!("Rejected API provider {:?}: {}", name, e);
                false
            }
        }
    }

    /// Registers a provider from untyped JSON.
    pub fn add_provider_value(&self, name: &str, value: &Value) -> bool {
        match serde_json::from_value::<PartialApiConfig>(value.clone()) {
            Ok(partial) => self.add_provider(name, partial),
            Err(e) => {
                warn!("Rejected API provider {:?}: {}", name, e);
                false
            }
        }
    }

    /// Returns the configuration of `provider`.
    pub fn get_config(&self, provider: &str) -> Option<Arc<ApiConfig>> {
        self.configs.read().get(provider).cloned()
    }

    /// Lists registered provider names.
    pub fn list_providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.configs.read().keys().cloned().collect();
        providers.sort();
        providers
    }
}
