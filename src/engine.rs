//! Engine - wires storage, prober and job registry together
//!
//! `Engine::start` is the only way to obtain a [`MonitorService`]. It spawns
//! the registry and re-registers every stored monitor before returning, so no
//! create or delete can interleave with the startup sweep.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, trace};

use crate::actors::messages::RegisterOutcome;
use crate::actors::registry::JobRegistry;
use crate::config::SchedulerConfig;
use crate::monitors::MonitorService;
use crate::probe::HttpProber;
use crate::storage::StorageBackend;

/// A running scheduling engine
pub struct Engine {
    store: Arc<dyn StorageBackend>,
    registry: JobRegistry,
    monitors: MonitorService,
    cleanup_task: Option<JoinHandle<()>>,
}

impl Engine {
    /// Start the engine on top of an opened store
    ///
    /// With `retention_days` set, a background task deletes checks older than
    /// that every `cleanup_interval_hours`, starting right away.
    #[instrument(skip_all)]
    pub async fn start(
        store: Arc<dyn StorageBackend>,
        config: &SchedulerConfig,
        retention_days: Option<u32>,
    ) -> Result<Self> {
        let prober = Arc::new(
            HttpProber::new(config.probe_timeout()).context("Failed to create HTTP prober")?,
        );
        let registry = JobRegistry::spawn(store.clone(), prober);

        let monitors = store
            .list_monitors()
            .await
            .context("Failed to load monitors for scheduling")?;

        let mut created = 0;
        for monitor in &monitors {
            if registry.register(monitor, config.probe_on_startup).await == RegisterOutcome::Created {
                created += 1;
            }
        }
        info!(
            "scheduled {} monitor(s) on {} job(s)",
            monitors.len(),
            created
        );

        let cleanup_task = retention_days.map(|days| {
            tokio::spawn(run_retention(store.clone(), days, config.cleanup_interval()))
        });

        Ok(Self {
            monitors: MonitorService::new(store.clone(), registry.clone()),
            store,
            registry,
            cleanup_task,
        })
    }

    pub fn monitors(&self) -> &MonitorService {
        &self.monitors
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    /// Stop all jobs, the retention task and close the store
    ///
    /// In-flight firings complete before this returns.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }

        self.registry.shutdown().await;
        self.store.close().await.context("Failed to close storage")?;

        info!("engine stopped");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }
    }
}

async fn run_retention(store: Arc<dyn StorageBackend>, retention_days: u32, every: std::time::Duration) {
    debug!("retention cleanup enabled: {retention_days} days, every {every:?}");

    // The first tick completes immediately, which gives the cleanup on startup
    let mut ticker = time::interval(every);
    loop {
        ticker.tick().await;

        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
        match store.cleanup_old_checks(cutoff).await {
            Ok(0) => trace!("retention cleanup: no old checks to delete"),
            Ok(deleted) => info!("retention cleanup complete: deleted {deleted} old checks"),
            Err(e) => error!("failed to clean up old checks: {e}"),
        }
    }
}
