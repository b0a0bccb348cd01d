//! Row types for monitors, checks and incidents
//!
//! Timestamps are always UTC. SQLite stores them as Unix milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::DedupKey;

/// A persisted monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRow {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// Unique, URL-safe identifier derived from the name
    pub slug: String,

    /// Display name
    pub name: String,

    /// Target URL, stored normalized
    pub url: String,

    /// Probe interval in seconds (10-3600)
    pub interval_secs: u32,

    /// The only HTTP status that counts as up
    pub expected_status: u16,

    /// Owning user, if any
    pub owner: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl MonitorRow {
    /// The dedup key this monitor is probed under
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::from_normalized(self.url.clone(), self.interval_secs)
    }
}

/// A check outcome waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheck {
    pub monitor_id: String,

    /// Observed status code (None = no response)
    pub status_code: Option<u16>,

    pub ok: bool,

    /// Request latency (None = no response)
    pub latency_ms: Option<u64>,

    pub observed_at: DateTime<Utc>,
}

/// A stored check outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRow {
    pub id: i64,
    pub monitor_id: String,
    pub status_code: Option<u16>,
    pub ok: bool,
    pub latency_ms: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

/// A stored incident (outage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRow {
    pub id: i64,
    pub monitor_id: String,
    pub opened_at: DateTime<Utc>,

    /// None while the incident is open
    pub resolved_at: Option<DateTime<Utc>>,

    pub reason: String,
    pub last_status_code: Option<u16>,
}

impl IncidentRow {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// What writing a check did to the monitor's incident state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IncidentTransition {
    /// A new incident was opened
    Opened { incident_id: i64 },

    /// The open incident was resolved
    Resolved { incident_id: i64 },

    /// Nothing changed
    Unchanged,
}

/// Result of `StorageBackend::record_check`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCheck {
    pub check: CheckRow,
    pub transition: IncidentTransition,
}

/// Aggregated check statistics for one monitor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckSummary {
    /// Number of checks in the window
    pub samples: u64,

    /// Number of those checks that were ok
    pub ok_count: u64,

    /// Mean latency over checks that got a response
    pub avg_latency_ms: Option<f64>,

    /// Whether the most recent check (any time) was ok
    pub last_ok: Option<bool>,
}

impl CheckSummary {
    /// Uptime percentage rounded to two decimals, 0 when there are no samples
    pub fn uptime_pct(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let pct = self.ok_count as f64 / self.samples as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }
}
