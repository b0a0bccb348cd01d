//! Slug allocation under concurrent creation

use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use uptime_monitoring::actors::registry::JobRegistry;
use uptime_monitoring::monitors::service::MAX_SLUG_ATTEMPTS;
use uptime_monitoring::monitors::{MonitorError, MonitorService, NewMonitor};
use uptime_monitoring::storage::StorageBackend;
use uptime_monitoring::storage::memory::MemoryBackend;

use crate::helpers::*;

async fn create_concurrently(service: &MonitorService, name: &str, count: usize) -> Vec<String> {
    let handles = (0..count).map(|i| {
        let service = service.clone();
        let new = NewMonitor::new(name, format!("site-{i}.example"));
        tokio::spawn(async move { service.create(new).await })
    });

    let mut slugs: Vec<String> = join_all(handles)
        .await
        .into_iter()
        .map(|result| result.unwrap().unwrap().slug)
        .collect();
    slugs.sort();
    slugs
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_slugs() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let service = MonitorService::new(store, JobRegistry::stopped());

    let slugs = create_concurrently(&service, "My Site", 3).await;
    assert_eq!(slugs, vec!["my-site", "my-site-2", "my-site-3"]);
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_slugs_on_sqlite() {
    use uptime_monitoring::storage::sqlite::SqliteBackend;

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StorageBackend> =
        Arc::new(SqliteBackend::new(dir.path().join("slugs.db")).await.unwrap());
    let service = MonitorService::new(store.clone(), JobRegistry::stopped());

    let slugs = create_concurrently(&service, "My Site", 3).await;
    assert_eq!(slugs, vec!["my-site", "my-site-2", "my-site-3"]);

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_gives_up_after_bounded_retries() {
    let store = Arc::new(FlakyBackend::new());
    store.set_conflict_inserts(true);
    let service = MonitorService::new(store, JobRegistry::stopped());

    assert_matches!(
        service.create(NewMonitor::new("Busy", "busy.example")).await,
        Err(MonitorError::SlugConflict { attempts, .. }) if attempts == MAX_SLUG_ATTEMPTS
    );
}

#[tokio::test]
async fn test_symbol_only_names_get_placeholder_slugs() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let service = MonitorService::new(store, JobRegistry::stopped());

    let a = service.create(NewMonitor::new("!!!", "a.example")).await.unwrap();
    let b = service.create(NewMonitor::new("???", "b.example")).await.unwrap();

    assert_eq!(a.slug.len(), 32);
    assert_ne!(a.slug, b.slug);
}
