//! ProbeJobActor - the recurring timer behind one dedup key
//!
//! Each dedup key gets exactly one job. On every tick the job probes the key's
//! URL once and hands the result to the fan-out recorder, which writes a check
//! (and any incident change) for every monitor currently sharing the key.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → HTTP probe → Fan-out → [check + incident per monitor]
//!     ↑
//!     └─── Commands (FireNow, FireOnce, Shutdown)
//! ```
//!
//! A firing runs to completion before the job looks at its next tick or
//! command, so one group never probes concurrently with itself and a
//! `Shutdown` never interrupts a firing that has already started.

use std::sync::Arc;

use anyhow::Result;
use chrono::{SubsecRound, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, instrument, trace, warn};

use crate::dedup::DedupKey;
use crate::fanout::{FanoutRecorder, FanoutReport};
use crate::probe::HttpProber;
use crate::storage::StorageResult;

use super::messages::{JobCommand, RegistryCommand};

/// Actor that probes one dedup key at its interval
pub struct ProbeJobActor {
    key: DedupKey,

    /// Shared prober (one HTTP client for all jobs)
    prober: Arc<HttpProber>,

    recorder: FanoutRecorder,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<JobCommand>,

    /// Registry to notify when a firing finds no monitors left on the key
    ///
    /// Weak, so a job never keeps a stopped registry's channel open.
    reaper: Option<mpsc::WeakSender<RegistryCommand>>,

    /// Number of completed firings (for logging)
    firings: u64,
}

impl ProbeJobActor {
    pub fn new(
        key: DedupKey,
        prober: Arc<HttpProber>,
        recorder: FanoutRecorder,
        command_rx: mpsc::Receiver<JobCommand>,
        reaper: Option<mpsc::WeakSender<RegistryCommand>>,
    ) -> Self {
        Self {
            key,
            prober,
            recorder,
            command_rx,
            reaper,
            firings: 0,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first tick happens one full period after start; an initial result
    /// is requested explicitly with `FireOnce`. Runs until:
    /// - A Shutdown command is received
    /// - Every handle has been dropped
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn run(mut self) {
        debug!("starting probe job");

        let period = self.key.period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Commands first, so a shutdown wins over a pending tick
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(JobCommand::FireNow { respond_to }) => {
                            debug!("received FireNow command");
                            let result = self.fire().await;
                            let _ = respond_to.send(result);
                        }

                        Some(JobCommand::FireOnce) => {
                            debug!("received FireOnce command");
                            if let Err(e) = self.fire().await {
                                error!("one-shot firing failed: {}", e);
                            }
                        }

                        Some(JobCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.fire().await {
                        error!("scheduled firing failed: {}", e);
                    }
                }
            }
        }

        debug!(firings = self.firings, "probe job stopped");
    }

    /// Probe once and fan the result out
    ///
    /// All checks of one firing share the timestamp taken when the probe
    /// returned (millisecond precision, the resolution storage keeps).
    async fn fire(&mut self) -> StorageResult<FanoutReport> {
        trace!("probing {}", self.key.url());

        let probe = self.prober.probe(self.key.url()).await;
        let observed_at = Utc::now().trunc_subsecs(3);
        let report = self.recorder.record(&self.key, probe, observed_at).await;

        self.firings += 1;
        if let Ok(report) = &report
            && report.is_empty()
        {
            self.request_reap();
        }
        report
    }

    /// Ask the registry to cancel this job if the key is still unused
    ///
    /// Never blocks: the registry may itself be waiting for this job to stop.
    fn request_reap(&self) {
        let Some(registry) = self.reaper.as_ref().and_then(|weak| weak.upgrade()) else {
            return;
        };

        let cmd = RegistryCommand::Reap {
            key: self.key.clone(),
        };
        if registry.try_send(cmd).is_err() {
            debug!("registry busy or stopped, reap of {} deferred to next firing", self.key);
        }
    }
}

/// Cloneable trigger for a running job
#[derive(Debug, Clone)]
pub struct JobTrigger {
    sender: mpsc::Sender<JobCommand>,
    key: DedupKey,
}

impl JobTrigger {
    /// Fire immediately and wait for the fan-out report
    pub async fn fire_now(&self) -> Result<FanoutReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(JobCommand::FireNow { respond_to: tx })
            .await?;

        Ok(rx.await??)
    }

    /// Request one firing without waiting for it
    ///
    /// Returns false if the job is gone or its queue is full (a firing is
    /// already pending).
    pub fn fire_once(&self) -> bool {
        self.sender.try_send(JobCommand::FireOnce).is_ok()
    }

    pub fn key(&self) -> &DedupKey {
        &self.key
    }
}

/// Owner handle of a spawned ProbeJobActor
pub struct ProbeJob {
    trigger: JobTrigger,
    task: JoinHandle<()>,
}

impl ProbeJob {
    /// Spawn a new probe job for the key
    ///
    /// With a `reaper`, a firing that finds no monitors on the key asks the
    /// registry to re-check the key and cancel the job.
    pub fn spawn(
        key: DedupKey,
        prober: Arc<HttpProber>,
        recorder: FanoutRecorder,
        reaper: Option<mpsc::WeakSender<RegistryCommand>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = ProbeJobActor::new(key.clone(), prober, recorder, cmd_rx, reaper);
        let task = tokio::spawn(actor.run());

        Self {
            trigger: JobTrigger {
                sender: cmd_tx,
                key,
            },
            task,
        }
    }

    pub fn trigger(&self) -> JobTrigger {
        self.trigger.clone()
    }

    pub fn key(&self) -> &DedupKey {
        &self.trigger.key
    }

    /// Stop the job and wait until its task has exited
    ///
    /// An in-flight firing completes before the task exits.
    pub async fn shutdown(self) {
        let _ = self.trigger.sender.send(JobCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            error!("probe job for {} panicked: {}", self.trigger.key, e);
        }
    }
}
