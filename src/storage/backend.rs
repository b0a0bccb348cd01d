//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{CheckRow, CheckSummary, IncidentRow, MonitorRow, NewCheck, RecordedCheck};
use crate::dedup::DedupKey;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// The store is the source of truth for which monitors share a dedup key.
/// The scheduling engine never caches group membership; it asks
/// [`StorageBackend::monitors_for_key`] whenever it needs it.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// registry actor, every probe job and the monitor service.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Unique-constraint violations must be
/// reported as `StorageError::Conflict` so callers can retry on that kind.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert a new monitor
    ///
    /// Fails with `StorageError::Conflict` if the id or slug is taken.
    async fn insert_monitor(&self, monitor: &MonitorRow) -> StorageResult<()>;

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRow>>;

    async fn get_monitor_by_slug(&self, slug: &str) -> StorageResult<Option<MonitorRow>>;

    /// All monitors, newest first
    async fn list_monitors(&self) -> StorageResult<Vec<MonitorRow>>;

    /// Delete a monitor together with its checks and incidents
    ///
    /// Returns whether a monitor was deleted.
    async fn delete_monitor(&self, id: &str) -> StorageResult<bool>;

    /// Monitors whose normalized URL and interval equal the key
    async fn monitors_for_key(&self, key: &DedupKey) -> StorageResult<Vec<MonitorRow>>;

    /// Slugs equal to `base` or starting with `base-`
    ///
    /// The slug allocator filters the `base-<N>` shape itself.
    async fn slugs_matching(&self, base: &str) -> StorageResult<Vec<String>>;

    /// Append a check and advance the monitor's incident state
    ///
    /// Both happen in one transaction. Implementations read the monitor's
    /// open incident and apply [`crate::incidents::evaluate`]; a check older
    /// than the monitor's latest stored check is written but leaves the
    /// incident state untouched.
    async fn record_check(&self, check: NewCheck) -> StorageResult<RecordedCheck>;

    /// The N most recent checks for a monitor, oldest first
    async fn query_latest_checks(&self, monitor_id: &str, limit: usize)
    -> StorageResult<Vec<CheckRow>>;

    /// The monitor's open incident, if any
    async fn open_incident(&self, monitor_id: &str) -> StorageResult<Option<IncidentRow>>;

    /// All incidents of a monitor, newest first
    async fn list_incidents(&self, monitor_id: &str) -> StorageResult<Vec<IncidentRow>>;

    /// Aggregate the monitor's checks observed at or after `since`
    async fn summarize_checks(
        &self,
        monitor_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckSummary>;

    /// Delete checks older than the specified timestamp
    ///
    /// Used for retention policy enforcement. Returns the number of checks deleted.
    async fn cleanup_old_checks(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Get backend-specific statistics
    ///
    /// Returns a human-readable summary (e.g. "SQLite: 3 monitors, 1200 checks").
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
