//! HTTP transport for icon queries.

use async_trait::async_trait;
use iconkit_types::IconSetDocument;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::module::{ApiModule, ApiQuery, QueryOutcome, prepare_icon_queries};

/// Default module: `GET {host}{path}{prefix}.json?icons=...`.
#[derive(Debug, Clone)]
pub struct HttpApiModule {
    client: reqwest::Client,
}

impl HttpApiModule {
    /// Creates a module with a fresh HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("iconkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Creates a module sharing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetches `url` and parses the body as JSON.
    ///
    /// 404 aborts; other failures move on to the next host.
    async fn get_json(&self, url: &str, config: &ApiConfig) -> QueryOutcome<Value> {
        debug!("GET {}", url);

        let response = match self
            .client
            .get(url)
            .timeout(config.timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return QueryOutcome::Next(format!("{url}: {e}")),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return QueryOutcome::Abort(format!("{url}: {status}"));
        }
        if !status.is_success() {
            return QueryOutcome::Next(format!("{url}: {status}"));
        }

        match response.json().await {
            Ok(body) => QueryOutcome::Success(body),
            Err(e) => QueryOutcome::Next(format!("{url}: {e}")),
        }
    }
}

impl Default for HttpApiModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiModule for HttpApiModule {
    fn prepare(
        &self,
        provider: &str,
        prefix: &str,
        icons: &[String],
        config: &ApiConfig,
    ) -> Vec<ApiQuery> {
        prepare_icon_queries(provider, prefix, icons, config)
    }

    async fn send(&self, host: &str, query: &ApiQuery, config: &ApiConfig) -> QueryOutcome {
        let url = format!("{host}{}", query.uri);
        let body = match self.get_json(&url, config).await {
            QueryOutcome::Success(body) => body,
            QueryOutcome::Next(reason) => return QueryOutcome::Next(reason),
            QueryOutcome::Abort(reason) => return QueryOutcome::Abort(reason),
        };

        // The API answers a bare `404` for unknown icon sets
        if body.as_u64() == Some(404) {
            return QueryOutcome::Abort(format!("{url}: unknown icon set"));
        }

        match IconSetDocument::from_value(body) {
            Ok(document) if document.prefix == query.prefix => QueryOutcome::Success(document),
            Ok(document) => QueryOutcome::Next(format!(
                "{url}: expected prefix {}, got {}",
                query.prefix, document.prefix
            )),
            Err(e) => QueryOutcome::Next(format!("{url}: {e}")),
        }
    }

    async fn send_custom(&self, host: &str, uri: &str, config: &ApiConfig) -> QueryOutcome<Value> {
        self.get_json(&format!("{host}{uri}"), config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartialApiConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ApiConfig {
        ApiConfig::from_partial(PartialApiConfig::with_resources([server.uri()])).unwrap()
    }

    fn query(icons: &[&str]) -> ApiQuery {
        ApiQuery {
            provider: String::new(),
            prefix: "mdi".to_string(),
            icons: icons.iter().map(|s| s.to_string()).collect(),
            uri: format!("/mdi.json?icons={}", icons.join(",")),
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mdi.json"))
            .and(query_param("icons", "home"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "prefix": "mdi",
                "icons": { "home": { "body": "<path/>" } }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send(&mock_server.uri(), &query(&["home"]), &config)
            .await;

        match outcome {
            QueryOutcome::Success(document) => {
                assert_eq!(document.prefix, "mdi");
                assert!(document.icons.contains_key("home"));
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_custom_returns_raw_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mdi": { "name": "Material Design Icons" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send_custom(&mock_server.uri(), "/collections", &config)
            .await;

        assert_eq!(
            outcome,
            QueryOutcome::Success(json!({ "mdi": { "name": "Material Design Icons" } }))
        );
    }

    #[tokio::test]
    async fn test_send_404_aborts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send(&mock_server.uri(), &query(&["home"]), &config)
            .await;

        assert!(matches!(outcome, QueryOutcome::Abort(_)));
    }

    #[tokio::test]
    async fn test_send_404_body_aborts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(404)))
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send(&mock_server.uri(), &query(&["home"]), &config)
            .await;

        assert!(matches!(outcome, QueryOutcome::Abort(_)));
    }

    #[tokio::test]
    async fn test_send_server_error_moves_to_next_host() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send(&mock_server.uri(), &query(&["home"]), &config)
            .await;

        assert!(matches!(outcome, QueryOutcome::Next(_)));
    }

    #[tokio::test]
    async fn test_send_malformed_body_moves_to_next_host() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send(&mock_server.uri(), &query(&["home"]), &config)
            .await;

        assert!(matches!(outcome, QueryOutcome::Next(_)));
    }

    #[tokio::test]
    async fn test_send_wrong_prefix_moves_to_next_host() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "prefix": "fa",
                "icons": {}
            })))
            .mount(&mock_server)
            .await;

        let module = HttpApiModule::new();
        let config = config_for(&mock_server);
        let outcome = module
            .send(&mock_server.uri(), &query(&["home"]), &config)
            .await;

        assert!(matches!(outcome, QueryOutcome::Next(_)));
    }
}
