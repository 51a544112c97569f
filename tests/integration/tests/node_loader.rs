//! Integration tests for the build tooling loader
//!
//! Covers the filesystem fallback and the one-time warning for missing icons.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use iconkit_api::PartialApiConfig;
use iconkit_cache::CacheTiers;
use iconkit_core::{IconLibrary, LibraryConfig, NodeLoader, NodeLoaderOptions};
use tempfile::TempDir;
use tracing_subscriber::prelude::*;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct WarnCounter(Arc<Mutex<usize>>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        if visitor.0.contains("failed to load `build-script` icon") {
            *self.0.lock().unwrap() += 1;
        }
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.0, "{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }
}

async fn unknown_sets_host() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn library(server: &MockServer) -> IconLibrary {
    let mut config = LibraryConfig::new();
    config
        .providers
        .insert(String::new(), PartialApiConfig::with_resources([server.uri()]));
    IconLibrary::builder()
        .config(config)
        .cache(CacheTiers::in_memory())
        .build()
}

fn install_collection(root: &Path) {
    let dir = root.join("node_modules/@iconify-json/logos");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("icons.json"),
        r#"{
            "prefix": "logos",
            "icons": { "rust": { "body": "<path d=\"rust\"/>", "width": 32 } },
            "aliases": { "rust-lang": { "parent": "rust", "hFlip": true } }
        }"#,
    )
    .unwrap();
}

#[tokio::test]
async fn falls_back_to_installed_collection() {
    let server = unknown_sets_host().await;
    let project = TempDir::new().unwrap();
    install_collection(project.path());

    let library = library(&server);
    let loader = NodeLoader::new(&library);
    let options = NodeLoaderOptions {
        cwd: vec![project.path().join("src")],
        warn: None,
    };

    let rust = loader.load_node_icon("logos", "rust", &options).await.unwrap();
    assert_eq!(rust.width, 32.0);

    let alias = loader.load_node_icon("logos", "rustLang", &options).await.unwrap();
    assert!(alias.h_flip);
}

#[tokio::test]
async fn missing_icon_warns_once_per_tag() {
    let counter = Arc::new(Mutex::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&counter)));
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = unknown_sets_host().await;
    let project = TempDir::new().unwrap();
    let library = library(&server);
    let loader = NodeLoader::new(&library);
    let options = NodeLoaderOptions {
        cwd: vec![project.path().to_path_buf()],
        warn: Some("build-script".to_string()),
    };

    assert!(loader.load_node_icon("logos", "rust", &options).await.is_none());
    assert!(loader.load_node_icon("logos", "go", &options).await.is_none());

    assert_eq!(*counter.lock().unwrap(), 1);
}
