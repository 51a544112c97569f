//! Query dispatch with host rotation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use iconkit_types::IconSetDocument;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ApiConfig, ApiConfigRegistry};
use crate::error::DispatchError;
use crate::http::HttpApiModule;
use crate::module::{ApiModule, ApiQuery, QueryOutcome};

/// Result of one query within a fetch.
pub type QueryResult = (ApiQuery, Result<IconSetDocument, DispatchError>);

/// Sends icon queries to providers, rotating through their hosts.
pub struct QueryDispatcher {
    registry: Arc<ApiConfigRegistry>,
    default_module: Arc<dyn ApiModule>,
    modules: RwLock<HashMap<String, Arc<dyn ApiModule>>>,
}

impl QueryDispatcher {
    /// Creates a dispatcher using the HTTP module for every provider.
    pub fn new(registry: Arc<ApiConfigRegistry>) -> Self {
        Self::with_module(registry, Arc::new(HttpApiModule::new()))
    }

    /// Creates a dispatcher with a custom default module.
    pub fn with_module(registry: Arc<ApiConfigRegistry>, module: Arc<dyn ApiModule>) -> Self {
        Self {
            registry,
            default_module: module,
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Provider registry used by this dispatcher.
    pub fn registry(&self) -> &Arc<ApiConfigRegistry> {
        &self.registry
    }

    /// Overrides the module for one provider.
    pub fn set_module(&self, provider: &str, module: Arc<dyn ApiModule>) {
        self.modules.write().insert(provider.to_string(), module);
    }

    fn module_for(&self, provider: &str) -> Arc<dyn ApiModule> {
        self.modules
            .read()
            .get(provider)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_module))
    }

    /// Prepares queries for `icons` of one icon set.
    pub fn prepare(
        &self,
        provider: &str,
        prefix: &str,
        icons: &[String],
    ) -> Result<Vec<ApiQuery>, DispatchError> {
        let config = self
            .registry
            .get_config(provider)
            .ok_or_else(|| DispatchError::UnknownProvider(provider.to_string()))?;
        Ok(self.module_for(provider).prepare(provider, prefix, icons, &config))
    }

    /// Sends one query, trying each host at most once.
    ///
    /// Starts at the provider's rotation index and wraps around. The host
    /// that answers becomes the new rotation start.
    pub async fn send_query(&self, query: &ApiQuery) -> Result<IconSetDocument, DispatchError> {
        self.rotate(&query.provider, query).await
    }

    /// Requests `uri` from the provider's hosts and returns the JSON body.
    ///
    /// Uses the same host rotation as icon queries.
    pub async fn send_custom_query(
        &self,
        provider: &str,
        uri: &str,
    ) -> Result<Value, DispatchError> {
        self.rotate(provider, &CustomQuery(uri)).await
    }

    async fn rotate<R: Request>(
        &self,
        provider: &str,
        request: &R,
    ) -> Result<R::Output, DispatchError> {
        let config = self
            .registry
            .get_config(provider)
            .ok_or_else(|| DispatchError::UnknownProvider(provider.to_string()))?;
        let module = self.module_for(provider);

        let hosts = config.resources();
        let start = config.start_index();
        let mut last_error = String::new();

        for attempt in 0..hosts.len() {
            let index = (start + attempt) % hosts.len();
            match request.send(module.as_ref(), &hosts[index], &config).await {
                QueryOutcome::Success(output) => {
                    if index != start {
                        debug!("Rotating provider {:?} to host {}", provider, hosts[index]);
                        config.set_start_index(index);
                    }
                    return Ok(output);
                }
                QueryOutcome::Next(reason) => {
                    debug!("Host failed, trying next: {}", reason);
                    last_error = reason;
                }
                QueryOutcome::Abort(reason) => {
                    return Err(DispatchError::NotFound(reason));
                }
            }
        }

        warn!(
            "All hosts failed for provider {:?}, {}: {}",
            provider,
            request.uri(),
            last_error
        );
        Err(DispatchError::Exhausted {
            attempts: hosts.len(),
            last_error,
        })
    }

    /// Fetches `icons` of one icon set, running all prepared queries concurrently.
    pub async fn fetch(
        &self,
        provider: &str,
        prefix: &str,
        icons: &[String],
    ) -> Result<Vec<QueryResult>, DispatchError> {
        let queries = self.prepare(provider, prefix, icons)?;
        let results = join_all(queries.iter().map(|query| self.send_query(query))).await;
        Ok(queries.into_iter().zip(results).collect())
    }
}

/// Something the dispatcher can send to one host.
#[async_trait]
trait Request: Sync {
    type Output: Send;

    fn uri(&self) -> &str;

    async fn send(
        &self,
        module: &dyn ApiModule,
        host: &str,
        config: &ApiConfig,
    ) -> QueryOutcome<Self::Output>;
}

#[async_trait]
impl Request for ApiQuery {
    type Output = IconSetDocument;

    fn uri(&self) -> &str {
        &self.uri
    }

    async fn send(
        &self,
        module: &dyn ApiModule,
        host: &str,
        config: &ApiConfig,
    ) -> QueryOutcome<IconSetDocument> {
        module.send(host, self, config).await
    }
}

struct CustomQuery<'a>(&'a str);

#[async_trait]
impl<'a> Request for CustomQuery<'a> {
    type Output = Value;

    fn uri(&self) -> &str {
        self.0
    }

    async fn send(
        &self,
        module: &dyn ApiModule,
        host: &str,
        config: &ApiConfig,
    ) -> QueryOutcome<Value> {
        module.send_custom(host, self.0, config).await
    }
}
