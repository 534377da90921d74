//! Ordinary requests: stale-while-revalidate and cache-first.

mod common;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use shellcache_core::worker::SeedSet;
use shellcache_core::{FetchError, Interceptor, OrdinaryStrategy, RefreshOutcome, Request};
use tokio::sync::mpsc;
use tokio::time::Instant;

use common::{get, identity, origin, url, EventLog, RecordingStorage, ScriptedNetwork};

fn interceptor(
    storage: &RecordingStorage,
    network: &ScriptedNetwork,
) -> (Interceptor<RecordingStorage, ScriptedNetwork>, mpsc::Receiver<RefreshOutcome>) {
    let (tx, rx) = mpsc::channel(16);
    let seeds = Arc::new(SeedSet::resolve(&origin()).expect("seeds"));
    let interceptor =
        Interceptor::new(storage.clone(), network.clone(), seeds).with_refresh_reports(tx);
    (interceptor, rx)
}

#[tokio::test(start_paused = true)]
async fn test_hit_served_stale_then_refreshed() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/", "old-shell").await;
    network.respond(Method::GET, "/", 200, "new-shell");
    network.delay(Method::GET, "/", Duration::from_secs(5));
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let started = Instant::now();
    let response = interceptor.handle(get("/")).await.expect("response");

    assert_eq!(response.text(), "old-shell");
    assert!(started.elapsed() < Duration::from_secs(5), "hit waited on the network");

    let outcome = rx.recv().await.expect("refresh outcome");
    assert_eq!(outcome, RefreshOutcome::Updated { identity: identity("/") });
    assert_eq!(storage.peek("/").await.as_deref(), Some("new-shell"));

    let again = interceptor.handle(get("/")).await.expect("response");
    assert_eq!(again.text(), "new-shell");
}

#[tokio::test(start_paused = true)]
async fn test_refresh_completes_after_client_goes_away() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/ledger/ui/", "old").await;
    network.respond(Method::GET, "/ledger/ui/", 200, "new");
    network.delay(Method::GET, "/ledger/ui/", Duration::from_secs(1));
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let response = interceptor.handle(get("/ledger/ui/")).await.expect("response");
    drop(response);
    drop(interceptor);

    let outcome = rx.recv().await.expect("refresh outcome");
    assert!(matches!(outcome, RefreshOutcome::Updated { .. }));
    assert_eq!(storage.peek("/ledger/ui/").await.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_miss_with_network_failure_rejects_and_creates_nothing() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    network.fail(Method::GET, "/report");
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let result = interceptor.handle(get("/report")).await;

    assert!(matches!(result, Err(FetchError::Offline(_))));
    assert!(storage.cached_paths().await.is_empty());
    assert!(rx.try_recv().is_err(), "a miss must not start a refresh");
}

#[tokio::test]
async fn test_miss_is_served_from_network_but_not_stored() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    network.respond(Method::GET, "/ledger/ui/balance/", 200, "balance");
    let (interceptor, _rx) = interceptor(&storage, &network);

    let response = interceptor.handle(get("/ledger/ui/balance/")).await.expect("response");

    assert_eq!(response.text(), "balance");
    assert!(storage.peek("/ledger/ui/balance/").await.is_none());
}

#[tokio::test]
async fn test_error_status_refresh_leaves_entry_untouched() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/", "old-shell").await;
    network.respond(Method::GET, "/", 404, "gone");
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let response = interceptor.handle(get("/")).await.expect("response");
    assert_eq!(response.text(), "old-shell");

    let outcome = rx.recv().await.expect("refresh outcome");
    assert_eq!(
        outcome,
        RefreshOutcome::Rejected {
            identity: identity("/"),
            status: StatusCode::NOT_FOUND,
        }
    );
    assert_eq!(storage.peek("/").await.as_deref(), Some("old-shell"));
}

#[tokio::test]
async fn test_failed_refresh_is_invisible_to_client() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/static/style.css", "body {}").await;
    network.fail(Method::GET, "/static/style.css");
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let response = interceptor.handle(get("/static/style.css")).await.expect("response");
    assert_eq!(response.text(), "body {}");

    let outcome = rx.recv().await.expect("refresh outcome");
    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
    assert_eq!(outcome.identity(), &identity("/static/style.css"));
    assert_eq!(storage.peek("/static/style.css").await.as_deref(), Some("body {}"));
}

#[tokio::test]
async fn test_unavailable_cache_degrades_to_network() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/", "old-shell").await;
    storage.set_unavailable(true);
    network.respond(Method::GET, "/", 200, "live");
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let response = interceptor.handle(get("/")).await.expect("response");

    assert_eq!(response.text(), "live");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_non_get_never_touches_cache() {
    let log = EventLog::default();
    let storage = RecordingStorage::with_log(log.clone());
    let network = ScriptedNetwork::with_log(log.clone());
    network.respond(Method::POST, "/ledger/ui/submit/", 200, "saved");
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let request =
        Request::new(Method::POST, url("/ledger/ui/submit/")).with_body("payee=Shop&amount=3");
    let response = interceptor.handle(request).await.expect("response");

    assert_eq!(response.text(), "saved");
    assert_eq!(log.entries(), vec!["fetch POST /ledger/ui/submit/".to_string()]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_cache_first_hit_skips_network() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/", "cached").await;
    network.respond(Method::GET, "/", 200, "fresh");
    let (interceptor, mut rx) = interceptor(&storage, &network);
    let interceptor = interceptor.with_strategy(OrdinaryStrategy::CacheFirst);

    let response = interceptor.handle(get("/")).await.expect("response");

    assert_eq!(response.text(), "cached");
    assert_eq!(network.call_count(Method::GET, "/"), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_cache_first_miss_goes_to_network_without_writing() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    network.respond(Method::GET, "/ledger/ui/charts/", 200, "charts");
    let (interceptor, _rx) = interceptor(&storage, &network);
    let interceptor = interceptor.with_strategy(OrdinaryStrategy::CacheFirst);

    let response = interceptor.handle(get("/ledger/ui/charts/")).await.expect("response");

    assert_eq!(response.text(), "charts");
    assert!(storage.cached_paths().await.is_empty());
}

#[tokio::test]
async fn test_partial_content_refresh_leaves_entry_untouched() {
    let storage = RecordingStorage::default();
    let network = ScriptedNetwork::new();
    storage.preload("/static/style.css", "body { color: black }").await;
    network.respond(Method::GET, "/static/style.css", 206, "body");
    let (interceptor, mut rx) = interceptor(&storage, &network);

    let ranged = get("/static/style.css").with_header("Range", "bytes=0-3");
    let response = interceptor.handle(ranged).await.expect("response");
    assert_eq!(response.text(), "body { color: black }");

    let outcome = rx.recv().await.expect("refresh outcome");
    assert_eq!(
        outcome,
        RefreshOutcome::Rejected {
            identity: identity("/static/style.css"),
            status: StatusCode::PARTIAL_CONTENT,
        }
    );

    let full = interceptor.handle(get("/static/style.css")).await.expect("response");
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.text(), "body { color: black }");
}
