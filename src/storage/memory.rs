//! In-memory storage backend (no persistence)
//!
//! This backend keeps monitors, checks and incidents in plain vectors.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the hub with `"backend": "none"`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Linear scans**: Fine for tests and small deployments only

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    CheckRow, CheckSummary, IncidentRow, IncidentTransition, MonitorRow, NewCheck, RecordedCheck,
};
use crate::dedup::DedupKey;
use crate::incidents::{self, IncidentAction, IncidentState};

#[derive(Debug, Default)]
struct MemoryState {
    monitors: Vec<MonitorRow>,
    checks: Vec<CheckRow>,
    incidents: Vec<IncidentRow>,
    next_check_id: i64,
    next_incident_id: i64,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StorageError::BackendError("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_monitor(&self, monitor: &MonitorRow) -> StorageResult<()> {
        let mut state = self.lock()?;

        if state.monitors.iter().any(|m| m.id == monitor.id) {
            return Err(StorageError::Conflict(format!("monitors.id: {}", monitor.id)));
        }
        if state.monitors.iter().any(|m| m.slug == monitor.slug) {
            return Err(StorageError::Conflict(format!(
                "monitors.slug: {}",
                monitor.slug
            )));
        }

        state.monitors.push(monitor.clone());
        Ok(())
    }

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRow>> {
        let state = self.lock()?;
        Ok(state.monitors.iter().find(|m| m.id == id).cloned())
    }

    async fn get_monitor_by_slug(&self, slug: &str) -> StorageResult<Option<MonitorRow>> {
        let state = self.lock()?;
        Ok(state.monitors.iter().find(|m| m.slug == slug).cloned())
    }

    async fn list_monitors(&self) -> StorageResult<Vec<MonitorRow>> {
        let state = self.lock()?;
        let mut monitors: Vec<MonitorRow> = state.monitors.iter().rev().cloned().collect();
        monitors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(monitors)
    }

    async fn delete_monitor(&self, id: &str) -> StorageResult<bool> {
        let mut state = self.lock()?;

        let before = state.monitors.len();
        state.monitors.retain(|m| m.id != id);
        if state.monitors.len() == before {
            return Ok(false);
        }

        state.checks.retain(|c| c.monitor_id != id);
        state.incidents.retain(|i| i.monitor_id != id);
        debug!("deleted monitor {id} with its checks and incidents");
        Ok(true)
    }

    async fn monitors_for_key(&self, key: &DedupKey) -> StorageResult<Vec<MonitorRow>> {
        let state = self.lock()?;
        Ok(state
            .monitors
            .iter()
            .filter(|m| m.url == key.url() && m.interval_secs == key.interval_secs())
            .cloned()
            .collect())
    }

    async fn slugs_matching(&self, base: &str) -> StorageResult<Vec<String>> {
        let state = self.lock()?;
        let prefix = format!("{base}-");
        Ok(state
            .monitors
            .iter()
            .filter(|m| m.slug == base || m.slug.starts_with(&prefix))
            .map(|m| m.slug.clone())
            .collect())
    }

    async fn record_check(&self, check: NewCheck) -> StorageResult<RecordedCheck> {
        let mut state = self.lock()?;

        if !state.monitors.iter().any(|m| m.id == check.monitor_id) {
            return Err(StorageError::QueryFailed(format!(
                "unknown monitor: {}",
                check.monitor_id
            )));
        }

        let latest = state
            .checks
            .iter()
            .filter(|c| c.monitor_id == check.monitor_id)
            .map(|c| c.observed_at)
            .max();
        let stale = latest.is_some_and(|ts| check.observed_at < ts);

        state.next_check_id += 1;
        let row = CheckRow {
            id: state.next_check_id,
            monitor_id: check.monitor_id.clone(),
            status_code: check.status_code,
            ok: check.ok,
            latency_ms: check.latency_ms,
            observed_at: check.observed_at,
        };
        state.checks.push(row.clone());

        if stale {
            debug!("check for {} is older than the latest one, incident state kept", check.monitor_id);
            return Ok(RecordedCheck {
                check: row,
                transition: IncidentTransition::Unchanged,
            });
        }

        let current = IncidentState::from_open(
            state
                .incidents
                .iter()
                .find(|i| i.monitor_id == check.monitor_id && i.is_open()),
        );

        let transition = match incidents::evaluate(current, &check) {
            IncidentAction::Open {
                reason,
                last_status_code,
            } => {
                state.next_incident_id += 1;
                let incident_id = state.next_incident_id;
                state.incidents.push(IncidentRow {
                    id: incident_id,
                    monitor_id: check.monitor_id.clone(),
                    opened_at: check.observed_at,
                    resolved_at: None,
                    reason: reason.to_string(),
                    last_status_code,
                });
                IncidentTransition::Opened { incident_id }
            }
            IncidentAction::Resolve {
                incident_id,
                resolved_at,
            } => {
                if let Some(incident) = state.incidents.iter_mut().find(|i| i.id == incident_id) {
                    incident.resolved_at = Some(resolved_at);
                }
                IncidentTransition::Resolved { incident_id }
            }
            IncidentAction::None => IncidentTransition::Unchanged,
        };

        Ok(RecordedCheck {
            check: row,
            transition,
        })
    }

    async fn query_latest_checks(
        &self,
        monitor_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        let state = self.lock()?;
        let mut checks: Vec<CheckRow> = state
            .checks
            .iter()
            .filter(|c| c.monitor_id == monitor_id)
            .cloned()
            .collect();
        checks.sort_by(|a, b| (a.observed_at, a.id).cmp(&(b.observed_at, b.id)));

        let skip = checks.len().saturating_sub(limit);
        Ok(checks.into_iter().skip(skip).collect())
    }

    async fn open_incident(&self, monitor_id: &str) -> StorageResult<Option<IncidentRow>> {
        let state = self.lock()?;
        Ok(state
            .incidents
            .iter()
            .find(|i| i.monitor_id == monitor_id && i.is_open())
            .cloned())
    }

    async fn list_incidents(&self, monitor_id: &str) -> StorageResult<Vec<IncidentRow>> {
        let state = self.lock()?;
        let mut incidents: Vec<IncidentRow> = state
            .incidents
            .iter()
            .filter(|i| i.monitor_id == monitor_id)
            .cloned()
            .collect();
        incidents.sort_by(|a, b| (b.opened_at, b.id).cmp(&(a.opened_at, a.id)));
        Ok(incidents)
    }

    async fn summarize_checks(
        &self,
        monitor_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckSummary> {
        let state = self.lock()?;
        let mut summary = CheckSummary::default();
        let mut latency_total = 0u64;
        let mut latency_samples = 0u64;

        for check in state
            .checks
            .iter()
            .filter(|c| c.monitor_id == monitor_id && c.observed_at >= since)
        {
            summary.samples += 1;
            if check.ok {
                summary.ok_count += 1;
            }
            if let Some(latency) = check.latency_ms {
                latency_total += latency;
                latency_samples += 1;
            }
        }

        if latency_samples > 0 {
            summary.avg_latency_ms = Some(latency_total as f64 / latency_samples as f64);
        }

        summary.last_ok = state
            .checks
            .iter()
            .filter(|c| c.monitor_id == monitor_id)
            .max_by_key(|c| (c.observed_at, c.id))
            .map(|c| c.ok);

        Ok(summary)
    }

    async fn cleanup_old_checks(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.lock()?;
        let count = state.checks.len();
        state.checks.retain(|c| c.observed_at >= before);
        Ok(count - state.checks.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory backend operational".to_string(),
            metadata,
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let state = self.lock()?;
        let open = state.incidents.iter().filter(|i| i.is_open()).count();
        Ok(format!(
            "In-memory: {} monitors, {} checks, {} open incidents",
            state.monitors.len(),
            state.checks.len(),
            open
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
