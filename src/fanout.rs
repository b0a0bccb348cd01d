//! Fan-out recorder
//!
//! One probe result is shared by every monitor in its dedup group. The
//! recorder asks the store who is in the group *now* (not when the job was
//! created), so monitors added after the job started are covered by its next
//! firing, and writes one check per member.
//!
//! Each member is written in its own transaction. A failed write is logged
//! and counted; the remaining members are still written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::dedup::DedupKey;
use crate::probe::ProbeResult;
use crate::storage::schema::{IncidentTransition, NewCheck};
use crate::storage::{StorageBackend, StorageResult};

/// Whether a probe result counts as up for a monitor
///
/// The status must equal the monitor's expected status exactly; a missing
/// response is always down.
pub fn is_ok(status_code: Option<u16>, expected_status: u16) -> bool {
    status_code == Some(expected_status)
}

/// Summary of one fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub key: DedupKey,
    pub probe: ProbeResult,
    pub observed_at: DateTime<Utc>,

    /// Checks written
    pub recorded: usize,

    /// Members whose write failed
    pub failed: usize,

    /// Incidents opened by this firing
    pub opened: usize,

    /// Incidents resolved by this firing
    pub resolved: usize,
}

impl FanoutReport {
    /// No monitor was using the key when the firing ran
    pub fn is_empty(&self) -> bool {
        self.recorded == 0 && self.failed == 0
    }
}

/// Writes one probe result to every monitor sharing its key
#[derive(Clone)]
pub struct FanoutRecorder {
    store: Arc<dyn StorageBackend>,
}

impl FanoutRecorder {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    /// Record `probe` for all current members of `key`
    ///
    /// Fails only if the membership query fails; per-monitor write failures
    /// are reported in [`FanoutReport::failed`].
    #[instrument(skip(self, probe), fields(key = %key))]
    pub async fn record(
        &self,
        key: &DedupKey,
        probe: ProbeResult,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<FanoutReport> {
        let members = self.store.monitors_for_key(key).await?;

        let mut report = FanoutReport {
            key: key.clone(),
            probe,
            observed_at,
            recorded: 0,
            failed: 0,
            opened: 0,
            resolved: 0,
        };

        if members.is_empty() {
            debug!("no monitors left for this key, nothing to record");
            return Ok(report);
        }

        for monitor in members {
            let check = NewCheck {
                monitor_id: monitor.id.clone(),
                status_code: probe.status_code,
                ok: is_ok(probe.status_code, monitor.expected_status),
                latency_ms: probe.latency_ms,
                observed_at,
            };

            match self.store.record_check(check).await {
                Ok(recorded) => {
                    report.recorded += 1;
                    match recorded.transition {
                        IncidentTransition::Opened { incident_id } => {
                            report.opened += 1;
                            debug!("monitor {} is down, opened incident {incident_id}", monitor.slug);
                        }
                        IncidentTransition::Resolved { incident_id } => {
                            report.resolved += 1;
                            debug!("monitor {} is back up, resolved incident {incident_id}", monitor.slug);
                        }
                        IncidentTransition::Unchanged => {}
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!("failed to record check for monitor {}: {}", monitor.id, e);
                }
            }
        }

        debug!(
            recorded = report.recorded,
            failed = report.failed,
            "fan-out complete"
        );
        Ok(report)
    }
}
