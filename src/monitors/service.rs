//! MonitorService - create, delete and read monitors

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::actors::registry::JobRegistry;
use crate::dedup::{DedupKey, normalize_url};
use crate::storage::schema::{CheckRow, IncidentRow, MonitorRow};
use crate::storage::{StorageBackend, StorageError};

use super::slug::{next_available, slugify};
use super::{MAX_INTERVAL_SECS, MIN_INTERVAL_SECS, MonitorError, NewMonitor};

/// How many times creation re-scans slugs after losing an insert race
pub const MAX_SLUG_ATTEMPTS: usize = 5;

/// Time window for [`MonitorService::summary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SummaryRange {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl SummaryRange {
    /// Parse `24h`, `7d` or `30d`; anything else is `24h`
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim() {
            "7d" => SummaryRange::Week,
            "30d" => SummaryRange::Month,
            _ => SummaryRange::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryRange::Day => "24h",
            SummaryRange::Week => "7d",
            SummaryRange::Month => "30d",
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            SummaryRange::Day => Duration::hours(24),
            SummaryRange::Week => Duration::days(7),
            SummaryRange::Month => Duration::days(30),
        }
    }
}

/// Uptime figures for one monitor over a [`SummaryRange`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSummary {
    pub range: SummaryRange,
    pub samples: u64,
    pub uptime_pct: f64,
    pub avg_latency_ms: Option<f64>,
    pub last_ok: Option<bool>,
}

/// A monitor together with its most recent check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub monitor: MonitorRow,
    pub last_check: Option<CheckRow>,
}

/// Management surface over the store and the job registry
#[derive(Clone)]
pub struct MonitorService {
    store: Arc<dyn StorageBackend>,
    registry: JobRegistry,
}

impl MonitorService {
    pub fn new(store: Arc<dyn StorageBackend>, registry: JobRegistry) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Create a monitor and schedule it, probing once right away
    ///
    /// The slug is derived from the name. If a concurrent creation takes the
    /// chosen slug first, the taken slugs are re-read and the next candidate
    /// is tried, up to [`MAX_SLUG_ATTEMPTS`] times.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create(&self, new: NewMonitor) -> Result<MonitorRow, MonitorError> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&new.interval_secs) {
            return Err(MonitorError::InvalidInterval(new.interval_secs));
        }
        let url = normalize_url(&new.url)?;
        let base = slugify(&new.name);

        let mut slug = base.clone();
        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            let taken = self.store.slugs_matching(&base).await?;
            slug = next_available(&base, &taken);

            let monitor = MonitorRow {
                id: Uuid::new_v4().to_string(),
                slug: slug.clone(),
                name: new.name.clone(),
                url: url.clone(),
                interval_secs: new.interval_secs,
                expected_status: new.expected_status,
                owner: new.owner.clone(),
                created_at: Utc::now().trunc_subsecs(3),
            };

            match self.store.insert_monitor(&monitor).await {
                Ok(()) => {
                    let outcome = self.registry.register(&monitor, true).await;
                    info!(
                        "created monitor {} ({}) for {}, job {:?}",
                        monitor.slug,
                        monitor.id,
                        monitor.dedup_key(),
                        outcome
                    );
                    return Ok(monitor);
                }
                Err(StorageError::Conflict(msg)) => {
                    debug!("slug {slug} was taken on attempt {attempt}: {msg}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("giving up on slug allocation for {base} after {MAX_SLUG_ATTEMPTS} attempts");
        Err(MonitorError::SlugConflict {
            slug,
            attempts: MAX_SLUG_ATTEMPTS,
        })
    }

    /// Create the monitor unless one with the same name, URL and interval exists
    ///
    /// Returns the monitor and whether it was created. Used to seed monitors
    /// from the config file on every start.
    pub async fn ensure(&self, new: NewMonitor) -> Result<(MonitorRow, bool), MonitorError> {
        let key = DedupKey::new(&new.url, new.interval_secs)?;
        let existing = self
            .store
            .monitors_for_key(&key)
            .await?
            .into_iter()
            .find(|m| m.name == new.name);

        match existing {
            Some(monitor) => {
                debug!("monitor {} already exists, not seeding it", monitor.slug);
                Ok((monitor, false))
            }
            None => Ok((self.create(new).await?, true)),
        }
    }

    /// Delete a monitor, its checks and its incidents
    ///
    /// The job is cancelled only if no other monitor shares its key. A
    /// failure to update the registry is logged; the monitor is deleted
    /// regardless and its job stops writing for it on the next firing.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), MonitorError> {
        let monitor = self
            .store
            .get_monitor(id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))?;

        match self.registry.unregister(&monitor.id, &monitor.dedup_key()).await {
            Ok(outcome) => debug!("unregistered {}: {:?}", monitor.id, outcome),
            Err(e) => warn!("failed to unregister {} from its job: {}", monitor.id, e),
        }

        if !self.store.delete_monitor(&monitor.id).await? {
            return Err(MonitorError::NotFound(id.to_string()));
        }

        info!("deleted monitor {} ({})", monitor.slug, monitor.id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<MonitorRow, MonitorError> {
        self.store
            .get_monitor(id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<MonitorRow, MonitorError> {
        self.store
            .get_monitor_by_slug(slug)
            .await?
            .ok_or_else(|| MonitorError::NotFound(slug.to_string()))
    }

    /// All monitors, newest first
    pub async fn list(&self) -> Result<Vec<MonitorRow>, MonitorError> {
        Ok(self.store.list_monitors().await?)
    }

    /// The monitor's latest `limit` checks, oldest first
    pub async fn recent_checks(&self, id: &str, limit: usize) -> Result<Vec<CheckRow>, MonitorError> {
        let monitor = self.get(id).await?;
        Ok(self.store.query_latest_checks(&monitor.id, limit).await?)
    }

    /// The monitor's incidents, newest first
    pub async fn incidents(&self, id: &str) -> Result<Vec<IncidentRow>, MonitorError> {
        let monitor = self.get(id).await?;
        Ok(self.store.list_incidents(&monitor.id).await?)
    }

    pub async fn summary(&self, id: &str, range: SummaryRange) -> Result<MonitorSummary, MonitorError> {
        let monitor = self.get(id).await?;
        let since = Utc::now() - range.window();
        let stats = self.store.summarize_checks(&monitor.id, since).await?;

        Ok(MonitorSummary {
            range,
            samples: stats.samples,
            uptime_pct: stats.uptime_pct(),
            avg_latency_ms: stats.avg_latency_ms,
            last_ok: stats.last_ok,
        })
    }

    /// Public status of the monitor with this slug
    pub async fn status(&self, slug: &str) -> Result<StatusSnapshot, MonitorError> {
        let monitor = self.get_by_slug(slug).await?;
        let last_check = self.store.query_latest_checks(&monitor.id, 1).await?.pop();

        Ok(StatusSnapshot { monitor, last_check })
    }
}
