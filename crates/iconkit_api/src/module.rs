//! Pluggable query building and transport.

use async_trait::async_trait;
use iconkit_types::IconSetDocument;
use serde_json::Value;

use crate::config::ApiConfig;

/// One request for a batch of icons from a single icon set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiQuery {
    pub provider: String,
    pub prefix: String,
    pub icons: Vec<String>,
    /// Request target relative to the host, e.g. `/mdi.json?icons=home`.
    pub uri: String,
}

/// Result of sending a query to one host.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<T = IconSetDocument> {
    /// Host answered with the requested data.
    Success(T),
    /// Host failed; the next host should be tried.
    Next(String),
    /// The icon set does not exist; other hosts will not have it either.
    Abort(String),
}

/// Builds and sends icon queries for a provider.
#[async_trait]
pub trait ApiModule: Send + Sync {
    /// Splits `icons` into one or more queries.
    fn prepare(
        &self,
        provider: &str,
        prefix: &str,
        icons: &[String],
        config: &ApiConfig,
    ) -> Vec<ApiQuery>;

    /// Sends a query to a single host.
    async fn send(&self, host: &str, query: &ApiQuery, config: &ApiConfig) -> QueryOutcome;

    /// Requests an arbitrary `uri` from a single host and returns its JSON.
    ///
    /// The default implementation does not support custom queries.
    async fn send_custom(
        &self,
        _host: &str,
        uri: &str,
        _config: &ApiConfig,
    ) -> QueryOutcome<Value> {
        QueryOutcome::Abort(format!("{uri}: custom queries are not supported"))
    }
}

/// Splits icons into `/{prefix}.json?icons=a,b,c` queries that fit `maxURL`.
pub fn prepare_icon_queries(
    provider: &str,
    prefix: &str,
    icons: &[String],
    config: &ApiConfig,
) -> Vec<ApiQuery> {
    let base = format!("{}{}.json?icons=", config.path(), prefix);
    let longest_host = config
        .resources()
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(0);
    let max_length = config
        .max_url()
        .saturating_sub(longest_host + base.len());

    let mut batches: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut length = 0;

    for icon in icons {
        let added = icon.len() + usize::from(!current.is_empty());
        if !current.is_empty() && length + added > max_length {
            batches.push(std::mem::take(&mut current));
            length = 0;
        }
        length += icon.len() + usize::from(!current.is_empty());
        current.push(icon.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
        .into_iter()
        .map(|icons| ApiQuery {
            provider: provider.to_string(),
            prefix: prefix.to_string(),
            uri: format!("{base}{}", icons.join(",")),
            icons,
        })
        .collect()
}
