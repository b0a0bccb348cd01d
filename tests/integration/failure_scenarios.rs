//! Failure tests for the scheduling engine
//!
//! These tests verify that the system handles failures gracefully:
//! - Unreachable endpoints
//! - A single monitor's write failing inside a fan-out
//! - The store failing membership queries

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use uptime_monitoring::actors::registry::JobRegistry;
use uptime_monitoring::probe::HttpProber;
use uptime_monitoring::storage::StorageBackend;
use uptime_monitoring::storage::memory::MemoryBackend;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn unused_local_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}

#[tokio::test]
async fn test_unreachable_endpoint_is_down() {
    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let monitor = create_test_monitor("dead", &unused_local_url(), 60);
    store.insert_monitor(&monitor).await.unwrap();
    registry.register(&monitor, false).await;

    let report = registry
        .fire_now(&monitor.dedup_key())
        .await
        .unwrap()
        .unwrap();
    assert!(!report.probe.is_reachable());
    assert_eq!(report.opened, 1);

    let checks = store.query_latest_checks(&monitor.id, 1).await.unwrap();
    assert!(!checks[0].ok);
    assert_eq!(checks[0].status_code, None);
    assert_eq!(checks[0].latency_ms, None);

    let incident = store.open_incident(&monitor.id).await.unwrap().unwrap();
    assert_eq!(incident.last_status_code, None);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_timeout_is_down() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    let prober = Arc::new(HttpProber::new(Duration::from_millis(200)).unwrap());
    let registry = JobRegistry::spawn(store.clone(), prober);

    let monitor = create_test_monitor("slow", &mock_server.uri(), 60);
    store.insert_monitor(&monitor).await.unwrap();
    registry.register(&monitor, false).await;

    let report = registry
        .fire_now(&monitor.dedup_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.probe.status_code, None);
    assert_eq!(report.opened, 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_one_failed_write_does_not_stop_the_batch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let store = Arc::new(FlakyBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let ids = ["a", "b", "c"];
    for id in ids {
        let monitor = create_test_monitor(id, &mock_server.uri(), 60);
        store.insert_monitor(&monitor).await.unwrap();
        registry.register(&monitor, false).await;
    }
    store.fail_checks_for("b");

    let key = create_test_monitor("a", &mock_server.uri(), 60).dedup_key();
    let report = registry.fire_now(&key).await.unwrap().unwrap();
    assert_eq!(report.recorded, 2);
    assert_eq!(report.failed, 1);

    assert_eq!(store.query_latest_checks("a", 10).await.unwrap().len(), 1);
    assert!(store.query_latest_checks("b", 10).await.unwrap().is_empty());
    assert_eq!(store.query_latest_checks("c", 10).await.unwrap().len(), 1);

    // The job survives and keeps firing
    let report = registry.fire_now(&key).await.unwrap().unwrap();
    assert_eq!(report.recorded, 2);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_membership_failure_fails_the_firing_not_the_job() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let store = Arc::new(FlakyBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let monitor = create_test_monitor("m", &mock_server.uri(), 60);
    store.insert_monitor(&monitor).await.unwrap();
    registry.register(&monitor, false).await;

    store.set_fail_membership(true);
    assert!(registry.fire_now(&monitor.dedup_key()).await.is_err());

    store.set_fail_membership(false);
    let report = registry
        .fire_now(&monitor.dedup_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.recorded, 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_unregister_keeps_job_when_store_fails() {
    let store = Arc::new(FlakyBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let monitor = create_test_monitor("m", "https://keep.example", 60);
    store.insert_monitor(&monitor).await.unwrap();
    registry.register(&monitor, false).await;

    store.set_fail_membership(true);
    assert_matches!(
        registry.unregister(&monitor.id, &monitor.dedup_key()).await,
        Err(e) if !e.is_conflict()
    );
    assert_eq!(registry.job_count().await, 1);

    registry.shutdown().await;
}
