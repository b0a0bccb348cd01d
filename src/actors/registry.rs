//! JobRegistryActor - owns the dedup key → job map
//!
//! The registry is the only in-memory shared mutable state of the engine.
//! It runs as a single actor, so register/unregister commands are applied one
//! at a time and two callers can never both create (or both cancel) the job
//! for the same key.
//!
//! Group membership is *not* tracked here. On unregister the registry asks the
//! store which monitors still use the key, so registrations that raced with
//! the removal are seen.
//!
//! ```text
//! register(monitor)   → key = (normalized url, interval)
//!                        ├─ no job   → spawn ProbeJob   (Created)
//!                        └─ job      → reuse it         (Joined)
//!                        immediate?  → FireOnce on the key's job
//!
//! unregister(id, key) → store: monitors for key, minus id
//!                        ├─ none left → cancel job      (Cancelled)
//!                        └─ some left → keep job        (Retained)
//!
//! reap(key)           → sent by a job whose firing found no monitors
//!                        store: monitors for key
//!                        ├─ none     → cancel job
//!                        └─ some     → keep job
//! ```
//!
//! Two unregisters racing on the last two monitors of a key can each still
//! see the other one stored and both keep the job. The job's next firing
//! finds no members and asks to be reaped.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::dedup::DedupKey;
use crate::fanout::{FanoutRecorder, FanoutReport};
use crate::probe::HttpProber;
use crate::storage::schema::MonitorRow;
use crate::storage::{StorageBackend, StorageResult};

use super::job::{JobTrigger, ProbeJob};
use super::messages::{RegisterOutcome, RegistryCommand, UnregisterOutcome};

/// Actor owning one ProbeJob per active dedup key
pub struct JobRegistryActor {
    jobs: HashMap<DedupKey, ProbeJob>,

    /// Source of truth for group membership
    store: Arc<dyn StorageBackend>,

    prober: Arc<HttpProber>,

    recorder: FanoutRecorder,

    command_rx: mpsc::Receiver<RegistryCommand>,

    /// Handed to every job so it can ask for its own removal
    reaper: mpsc::WeakSender<RegistryCommand>,
}

impl JobRegistryActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        prober: Arc<HttpProber>,
        command_rx: mpsc::Receiver<RegistryCommand>,
        reaper: mpsc::WeakSender<RegistryCommand>,
    ) -> Self {
        Self {
            jobs: HashMap::new(),
            recorder: FanoutRecorder::new(store.clone()),
            store,
            prober,
            command_rx,
            reaper,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle is dropped;
    /// in both cases all jobs are stopped before the loop exits.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting job registry");

        let mut shutdown_ack = None;

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RegistryCommand::Register {
                    key,
                    monitor_id,
                    immediate,
                    respond_to,
                } => {
                    let outcome = self.register(key, &monitor_id, immediate);
                    let _ = respond_to.send(outcome);
                }

                RegistryCommand::Unregister {
                    key,
                    monitor_id,
                    respond_to,
                } => {
                    let outcome = self.unregister(key, &monitor_id).await;
                    let _ = respond_to.send(outcome);
                }

                RegistryCommand::Reap { key } => {
                    self.reap(key).await;
                }

                RegistryCommand::Trigger { key, respond_to } => {
                    let _ = respond_to.send(self.jobs.get(&key).map(ProbeJob::trigger));
                }

                RegistryCommand::ActiveKeys { respond_to } => {
                    let mut keys: Vec<DedupKey> = self.jobs.keys().cloned().collect();
                    keys.sort();
                    let _ = respond_to.send(keys);
                }

                RegistryCommand::Shutdown { respond_to } => {
                    debug!("received shutdown command");
                    shutdown_ack = Some(respond_to);
                    break;
                }
            }
        }

        let count = self.jobs.len();
        join_all(self.jobs.drain().map(|(_, job)| job.shutdown())).await;
        info!("job registry stopped ({count} jobs cancelled)");

        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn register(&mut self, key: DedupKey, monitor_id: &str, immediate: bool) -> RegisterOutcome {
        let outcome = if self.jobs.contains_key(&key) {
            debug!("monitor {monitor_id} joins existing job {key}");
            RegisterOutcome::Joined
        } else {
            debug!("monitor {monitor_id} creates job {key}");
            let job = ProbeJob::spawn(
                key.clone(),
                self.prober.clone(),
                self.recorder.clone(),
                Some(self.reaper.clone()),
            );
            self.jobs.insert(key.clone(), job);
            RegisterOutcome::Created
        };

        if immediate
            && let Some(job) = self.jobs.get(&key)
            && !job.trigger().fire_once()
        {
            debug!("job {key} already has a firing queued, skipping immediate probe");
        }

        outcome
    }

    async fn unregister(
        &mut self,
        key: DedupKey,
        monitor_id: &str,
    ) -> StorageResult<UnregisterOutcome> {
        if !self.jobs.contains_key(&key) {
            debug!("no job for {key}, nothing to unregister");
            return Ok(UnregisterOutcome::NotScheduled);
        }

        let remaining = match self.store.monitors_for_key(&key).await {
            Ok(monitors) => monitors.iter().filter(|m| m.id != monitor_id).count(),
            Err(e) => {
                warn!("could not load members of {key}, keeping its job: {e}");
                return Err(e);
            }
        };

        if remaining > 0 {
            debug!("job {key} still used by {remaining} monitor(s)");
            return Ok(UnregisterOutcome::Retained { remaining });
        }

        if let Some(job) = self.jobs.remove(&key) {
            debug!("monitor {monitor_id} was the last user, cancelling job {key}");
            // Don't block the registry on an in-flight firing
            tokio::spawn(job.shutdown());
        }

        Ok(UnregisterOutcome::Cancelled)
    }

    /// Cancel the key's job if no monitor uses the key any more
    async fn reap(&mut self, key: DedupKey) {
        if !self.jobs.contains_key(&key) {
            return;
        }

        match self.store.monitors_for_key(&key).await {
            Ok(monitors) if monitors.is_empty() => {
                if let Some(job) = self.jobs.remove(&key) {
                    info!("job {key} has no monitors left, cancelling it");
                    tokio::spawn(job.shutdown());
                }
            }
            Ok(monitors) => {
                debug!("job {key} gained {} monitor(s) again, keeping it", monitors.len());
            }
            Err(e) => warn!("could not load members of {key}, keeping its job: {e}"),
        }
    }
}

/// Handle for controlling the JobRegistryActor
#[derive(Clone)]
pub struct JobRegistry {
    sender: mpsc::Sender<RegistryCommand>,
}

impl JobRegistry {
    /// Spawn the registry actor
    pub fn spawn(store: Arc<dyn StorageBackend>, prober: Arc<HttpProber>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = JobRegistryActor::new(store, prober, cmd_rx, cmd_tx.downgrade());
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// A handle with no registry behind it
    ///
    /// Every operation is a no-op reporting `Inactive`, the same as after
    /// [`JobRegistry::shutdown`].
    pub fn stopped() -> Self {
        let (cmd_tx, _) = mpsc::channel(1);
        Self { sender: cmd_tx }
    }

    /// Whether the registry actor is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Ensure the monitor's key has a job, optionally probing right away
    pub async fn register(&self, monitor: &MonitorRow, immediate: bool) -> RegisterOutcome {
        let (tx, rx) = oneshot::channel();
        let cmd = RegistryCommand::Register {
            key: monitor.dedup_key(),
            monitor_id: monitor.id.clone(),
            immediate,
            respond_to: tx,
        };

        if self.sender.send(cmd).await.is_err() {
            debug!("registry not running, ignoring registration of {}", monitor.id);
            return RegisterOutcome::Inactive;
        }

        rx.await.unwrap_or(RegisterOutcome::Inactive)
    }

    /// Remove the monitor from its key, cancelling the job if it was the last user
    pub async fn unregister(
        &self,
        monitor_id: &str,
        key: &DedupKey,
    ) -> StorageResult<UnregisterOutcome> {
        let (tx, rx) = oneshot::channel();
        let cmd = RegistryCommand::Unregister {
            key: key.clone(),
            monitor_id: monitor_id.to_string(),
            respond_to: tx,
        };

        if self.sender.send(cmd).await.is_err() {
            debug!("registry not running, ignoring unregistration of {monitor_id}");
            return Ok(UnregisterOutcome::Inactive);
        }

        rx.await.unwrap_or(Ok(UnregisterOutcome::Inactive))
    }

    /// Get a trigger for the key's job
    pub async fn trigger(&self, key: &DedupKey) -> Option<JobTrigger> {
        let (tx, rx) = oneshot::channel();
        let cmd = RegistryCommand::Trigger {
            key: key.clone(),
            respond_to: tx,
        };

        self.sender.send(cmd).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Fire the key's job once and wait for the report
    ///
    /// Returns `Ok(None)` if the key has no job.
    pub async fn fire_now(&self, key: &DedupKey) -> Result<Option<FanoutReport>> {
        match self.trigger(key).await {
            Some(trigger) => Ok(Some(trigger.fire_now().await?)),
            None => Ok(None),
        }
    }

    /// Keys that currently have a job, sorted
    pub async fn active_keys(&self) -> Vec<DedupKey> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::ActiveKeys { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of jobs currently scheduled
    pub async fn job_count(&self) -> usize {
        self.active_keys().await.len()
    }

    /// Stop every job and the registry
    ///
    /// Waits until in-flight firings have finished.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
