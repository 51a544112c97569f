//! Integration tests for icon loading
//!
//! Runs the full path from icon names to HTTP hosts and the persistent cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use iconkit_api::PartialApiConfig;
use iconkit_cache::{CacheTiers, PersistentCache};
use iconkit_core::{IconLibrary, LibraryConfig, LoadResult};
use iconkit_types::IconName;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mdi(name: &str) -> IconName {
    IconName::new("", "mdi", name)
}

fn mdi_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "prefix": "mdi",
        "icons": {
            "home": { "body": "<path d=\"M10 20v-6h4v6\"/>", "width": 24, "height": 24 },
            "account": { "body": "<path d=\"M12 4a4 4 0 0 1 4 4\"/>" }
        },
        "aliases": {
            "house": { "parent": "home" }
        },
        "lastModified": 1700000000
    }))
}

async fn failing_host() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

/// Library whose default provider uses `hosts` and whose local cache lives in `cache_dir`.
fn library(hosts: &[&MockServer], cache_dir: &TempDir) -> IconLibrary {
    let mut config = LibraryConfig::new();
    config.providers.insert(
        String::new(),
        PartialApiConfig::with_resources(hosts.iter().map(|server| server.uri())),
    );

    let cache = CacheTiers::new(
        PersistentCache::with_dir(cache_dir.path()),
        PersistentCache::in_memory(),
    );
    IconLibrary::builder().config(config).cache(cache).build()
}

mod fetching {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn rotates_past_failing_host_and_persists() {
        let failing = failing_host().await;
        let working = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mdi.json"))
            .and(query_param("icons", "account,home"))
            .respond_with(mdi_response())
            .expect(1)
            .mount(&working)
            .await;

        let cache_dir = TempDir::new().unwrap();
        let library = library(&[&failing, &working], &cache_dir);

        let calls = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = oneshot::channel::<LoadResult>();
        let counter = Arc::clone(&calls);
        library.load_icons(&["mdi:home", "mdi:account"], move |result| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = sender.send(result);
        });

        let result = receiver.await.unwrap();
        assert_eq!(result.loaded, vec![mdi("home"), mdi("account")]);
        assert!(result.missing.is_empty());
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let home = library.get_icon_data("mdi:home").unwrap();
        assert_eq!(home.body, "<path d=\"M10 20v-6h4v6\"/>");
        assert_eq!(home.width, 24.0);

        let config = library.providers().get_config("").unwrap();
        assert_eq!(config.start_index(), 1);

        let persisted = PersistentCache::with_dir(cache_dir.path())
            .read("", "mdi")
            .unwrap();
        assert!(persisted.icons.contains_key("home"));
        assert!(persisted.icons.contains_key("account"));
    }

    #[tokio::test]
    async fn overlapping_requests_send_one_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mdi.json"))
            .respond_with(mdi_response())
            .expect(1)
            .mount(&server)
            .await;

        let cache_dir = TempDir::new().unwrap();
        let library = library(&[&server], &cache_dir);

        let first = library.load(&["mdi:home", "mdi:account"]);
        let second = library.load(&["mdi:account", "mdi:home"]);
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_complete());
        assert!(second.is_complete());
        server.verify().await;
    }

    #[tokio::test]
    async fn unknown_icon_set_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nope.json"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let cache_dir = TempDir::new().unwrap();
        let library = library(&[&server], &cache_dir);

        let result = library.load(&["nope:home"]).await;
        assert_eq!(result.missing, vec![IconName::new("", "nope", "home")]);

        // Not found is permanent: no second request
        let result = library.load(&["nope:home"]).await;
        assert_eq!(result.missing.len(), 1);
        server.verify().await;
    }

    #[tokio::test]
    async fn all_hosts_failing_reports_missing() {
        let first = failing_host().await;
        let second = failing_host().await;

        let cache_dir = TempDir::new().unwrap();
        let library = library(&[&first, &second], &cache_dir);

        let result = library.load(&["mdi:home"]).await;
        assert_eq!(result.missing, vec![mdi("home")]);
        assert!(library.get_icon_data("mdi:home").is_none());
        assert!(library.loader().cache().read("", "mdi").is_none());
    }
}

mod aborting {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn aborted_callback_never_fires() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(mdi_response().set_delay(Duration::from_millis(100)))
            .expect(1)
            .mount(&server)
            .await;

        let cache_dir = TempDir::new().unwrap();
        let library = library(&[&server], &cache_dir);

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = library.load_icons(&["mdi:home"], move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        handle.abort();

        let result = library.load(&["mdi:home"]).await;
        assert!(result.is_complete());
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(library.loader().pending_requests(), 0);
    }

    #[tokio::test]
    async fn dropped_future_detaches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(mdi_response().set_delay(Duration::from_millis(100)))
            .mount(&server)
            .await;

        let cache_dir = TempDir::new().unwrap();
        let library = library(&[&server], &cache_dir);

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), library.load(&["mdi:home"])).await;
        assert!(timed_out.is_err());
        assert_eq!(library.loader().pending_requests(), 0);
    }
}

mod persistence {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn cached_icons_survive_restart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(mdi_response())
            .expect(1)
            .mount(&server)
            .await;

        let cache_dir = TempDir::new().unwrap();
        {
            let library = library(&[&server], &cache_dir);
            assert!(library.load(&["mdi:home"]).await.is_complete());
        }

        let offline = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&offline)
            .await;

        let library = library(&[&offline], &cache_dir);
        assert_eq!(library.init_cache(), 1);
        assert!(library.icon_loaded("mdi:home"));
        assert!(library.icon_loaded("mdi:house"));

        let result = library.load(&["mdi:account"]).await;
        assert!(result.is_complete());
        offline.verify().await;
    }

    #[tokio::test]
    async fn cache_hit_without_warm_start() {
        let cache_dir = TempDir::new().unwrap();
        PersistentCache::with_dir(cache_dir.path()).write(
            "",
            "mdi",
            &iconkit_types::validate_icon_set(
                r#"{ "prefix": "mdi", "icons": { "home": { "body": "<g/>" } } }"#,
            )
            .unwrap(),
        );

        let offline = failing_host().await;
        let library = library(&[&offline], &cache_dir);

        let result = library.load(&["mdi:home"]).await;
        assert!(result.is_complete());
        assert_eq!(library.get_icon_data("mdi:home").unwrap().body, "<g/>");
    }
}
