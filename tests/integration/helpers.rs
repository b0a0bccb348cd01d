//! Helper functions for integration tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use uptime_monitoring::dedup::{DedupKey, normalize_url};
use uptime_monitoring::probe::HttpProber;
use uptime_monitoring::storage::backend::HealthStatus;
use uptime_monitoring::storage::memory::MemoryBackend;
use uptime_monitoring::storage::schema::{CheckSummary, NewCheck, RecordedCheck};
use uptime_monitoring::storage::{
    CheckRow, IncidentRow, MonitorRow, StorageBackend, StorageError, StorageResult,
};

pub fn create_test_monitor(id: &str, url: &str, interval_secs: u32) -> MonitorRow {
    MonitorRow {
        id: id.to_string(),
        slug: id.to_string(),
        name: format!("Test {id}"),
        url: normalize_url(url).unwrap(),
        interval_secs,
        expected_status: 200,
        owner: None,
        created_at: Utc::now().trunc_subsecs(3),
    }
}

pub fn test_prober() -> Arc<HttpProber> {
    Arc::new(HttpProber::new(Duration::from_secs(2)).unwrap())
}

/// Poll until the monitor has at least `count` checks or the timeout elapses
pub async fn wait_for_checks(
    store: &dyn StorageBackend,
    monitor_id: &str,
    count: usize,
    timeout: Duration,
) -> Vec<CheckRow> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let checks = store.query_latest_checks(monitor_id, 100).await.unwrap();
        if checks.len() >= count || tokio::time::Instant::now() >= deadline {
            return checks;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Memory backend that can be told to fail selected operations
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    failing_checks: Mutex<HashSet<String>>,
    fail_membership: Mutex<bool>,
    conflict_inserts: Mutex<bool>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `record_check` for this monitor fail
    pub fn fail_checks_for(&self, monitor_id: &str) {
        self.failing_checks
            .lock()
            .unwrap()
            .insert(monitor_id.to_string());
    }

    /// Make `monitors_for_key` fail (or succeed again)
    pub fn set_fail_membership(&self, fail: bool) {
        *self.fail_membership.lock().unwrap() = fail;
    }

    /// Make every `insert_monitor` report a uniqueness conflict
    pub fn set_conflict_inserts(&self, conflict: bool) {
        *self.conflict_inserts.lock().unwrap() = conflict;
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn insert_monitor(&self, monitor: &MonitorRow) -> StorageResult<()> {
        if *self.conflict_inserts.lock().unwrap() {
            return Err(StorageError::Conflict(format!("monitors.slug: {}", monitor.slug)));
        }
        self.inner.insert_monitor(monitor).await
    }

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRow>> {
        self.inner.get_monitor(id).await
    }

    async fn get_monitor_by_slug(&self, slug: &str) -> StorageResult<Option<MonitorRow>> {
        self.inner.get_monitor_by_slug(slug).await
    }

    async fn list_monitors(&self) -> StorageResult<Vec<MonitorRow>> {
        self.inner.list_monitors().await
    }

    async fn delete_monitor(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete_monitor(id).await
    }

    async fn monitors_for_key(&self, key: &DedupKey) -> StorageResult<Vec<MonitorRow>> {
        if *self.fail_membership.lock().unwrap() {
            return Err(StorageError::ConnectionFailed("injected failure".to_string()));
        }
        self.inner.monitors_for_key(key).await
    }

    async fn slugs_matching(&self, base: &str) -> StorageResult<Vec<String>> {
        self.inner.slugs_matching(base).await
    }

    async fn record_check(&self, check: NewCheck) -> StorageResult<RecordedCheck> {
        if self.failing_checks.lock().unwrap().contains(&check.monitor_id) {
            return Err(StorageError::QueryFailed(format!(
                "injected failure for {}",
                check.monitor_id
            )));
        }
        self.inner.record_check(check).await
    }

    async fn query_latest_checks(
        &self,
        monitor_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        self.inner.query_latest_checks(monitor_id, limit).await
    }

    async fn open_incident(&self, monitor_id: &str) -> StorageResult<Option<IncidentRow>> {
        self.inner.open_incident(monitor_id).await
    }

    async fn list_incidents(&self, monitor_id: &str) -> StorageResult<Vec<IncidentRow>> {
        self.inner.list_incidents(monitor_id).await
    }

    async fn summarize_checks(
        &self,
        monitor_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckSummary> {
        self.inner.summarize_checks(monitor_id, since).await
    }

    async fn cleanup_old_checks(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.inner.cleanup_old_checks(before).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn get_stats(&self) -> StorageResult<String> {
        self.inner.get_stats().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}
