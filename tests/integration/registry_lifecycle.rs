//! Job registry lifecycle tests
//!
//! These tests verify how jobs come and go as monitors register:
//! - One job per dedup key, shared by every monitor on it
//! - The job lives exactly as long as some monitor uses the key
//! - A job left without monitors by racing deletes removes itself
//! - Immediate registration probes once without waiting for the interval
//! - Cancellation lets an in-flight firing finish

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use uptime_monitoring::actors::messages::{RegisterOutcome, UnregisterOutcome};
use uptime_monitoring::actors::registry::JobRegistry;
use uptime_monitoring::monitors::service::MonitorService;
use uptime_monitoring::storage::StorageBackend;
use uptime_monitoring::storage::memory::MemoryBackend;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_job_lives_while_any_monitor_uses_the_key() {
    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let a = create_test_monitor("a", "https://x.com", 60);
    let b = create_test_monitor("b", "x.com/", 60);
    store.insert_monitor(&a).await.unwrap();
    store.insert_monitor(&b).await.unwrap();

    assert_eq!(registry.register(&a, false).await, RegisterOutcome::Created);
    assert_eq!(registry.register(&b, false).await, RegisterOutcome::Joined);
    assert_eq!(registry.active_keys().await, vec![a.dedup_key()]);

    // b is still stored, so removing a keeps the job
    assert_eq!(
        registry.unregister(&a.id, &a.dedup_key()).await.unwrap(),
        UnregisterOutcome::Retained { remaining: 1 }
    );
    store.delete_monitor(&a.id).await.unwrap();
    assert_eq!(registry.job_count().await, 1);

    assert_eq!(
        registry.unregister(&b.id, &b.dedup_key()).await.unwrap(),
        UnregisterOutcome::Cancelled
    );
    assert_eq!(registry.job_count().await, 0);

    assert_eq!(
        registry.unregister(&b.id, &b.dedup_key()).await.unwrap(),
        UnregisterOutcome::NotScheduled
    );

    registry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_create_one_job() {
    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let monitors: Vec<_> = (0..10)
        .map(|i| create_test_monitor(&format!("m{i}"), "https://shared.example", 60))
        .collect();

    let outcomes = join_all(monitors.iter().map(|monitor| {
        let registry = registry.clone();
        let monitor = monitor.clone();
        tokio::spawn(async move { registry.register(&monitor, false).await })
    }))
    .await;

    let created = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap())
        .filter(|outcome| *outcome == RegisterOutcome::Created)
        .count();

    assert_eq!(created, 1);
    assert_eq!(registry.job_count().await, 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_immediate_registration_probes_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    // Interval far beyond the test, so only the immediate firing can run
    let monitor = create_test_monitor("now", &mock_server.uri(), 3600);
    store.insert_monitor(&monitor).await.unwrap();

    registry.register(&monitor, true).await;

    let checks = wait_for_checks(store.as_ref(), &monitor.id, 1, Duration::from_secs(5)).await;
    assert_eq!(checks.len(), 1);
    assert!(checks[0].ok);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_job_fires_on_its_interval() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let monitor = create_test_monitor("tick", &mock_server.uri(), 1);
    store.insert_monitor(&monitor).await.unwrap();
    registry.register(&monitor, false).await;

    // Nothing before the first period has passed
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(store.query_latest_checks(&monitor.id, 10).await.unwrap().is_empty());

    let checks = wait_for_checks(store.as_ref(), &monitor.id, 2, Duration::from_secs(5)).await;
    assert!(checks.len() >= 2);
    assert!(checks[0].observed_at < checks[1].observed_at);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_cancel_lets_in_flight_firing_finish() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());

    let monitor = create_test_monitor("slow", &mock_server.uri(), 3600);
    store.insert_monitor(&monitor).await.unwrap();
    registry.register(&monitor, false).await;

    let trigger = registry.trigger(&monitor.dedup_key()).await.unwrap();
    let firing = tokio::spawn(async move { trigger.fire_now().await });

    // Let the probe start, then drop the last user of the key
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        registry.unregister(&monitor.id, &monitor.dedup_key()).await.unwrap(),
        UnregisterOutcome::Cancelled
    );

    let report = firing.await.unwrap().unwrap();
    assert_eq!(report.recorded, 1);
    assert_eq!(registry.job_count().await, 0);

    registry.shutdown().await;
}

async fn wait_for_job_count(registry: &JobRegistry, count: usize, timeout: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let current = registry.job_count().await;
        if current == count || tokio::time::Instant::now() >= deadline {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_of_last_members_leave_no_job() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    let registry = JobRegistry::spawn(store.clone(), test_prober());
    let service = Arc::new(MonitorService::new(store.clone(), registry.clone()));

    for round in 0..20 {
        let url = format!("{}/round/{round}", mock_server.uri());
        let pair = [
            create_test_monitor(&format!("left-{round}"), &url, 3600),
            create_test_monitor(&format!("right-{round}"), &url, 3600),
        ];
        for monitor in &pair {
            store.insert_monitor(monitor).await.unwrap();
            registry.register(monitor, false).await;
        }
        let key = pair[0].dedup_key();
        assert_eq!(registry.active_keys().await, vec![key.clone()]);

        // Each delete may see the other monitor still stored and keep the job
        let deletes = join_all(pair.iter().map(|monitor| {
            let service = service.clone();
            let id = monitor.id.clone();
            tokio::spawn(async move { service.delete(&id).await })
        }))
        .await;
        for result in deletes {
            result.unwrap().unwrap();
        }

        // A surviving job finds no monitors on its next firing and is removed
        let _ = registry.fire_now(&key).await;
        assert_eq!(
            wait_for_job_count(&registry, 0, Duration::from_secs(5)).await,
            0,
            "round {round} left a job behind"
        );
    }

    registry.shutdown().await;
}
