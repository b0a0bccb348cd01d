//! Message types for actor communication
//!
//! This module defines all message types used for communication between actors.
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Responses**: oneshot channels carry results back to the caller
//! 3. **Plain data**: Outcomes are small `Copy`/`Clone` values that can be logged

use serde::Serialize;
use tokio::sync::oneshot;

use crate::dedup::DedupKey;
use crate::fanout::FanoutReport;
use crate::storage::StorageResult;

use super::job::JobTrigger;

/// Commands that can be sent to a ProbeJobActor
#[derive(Debug)]
pub enum JobCommand {
    /// Fire immediately and report the result
    ///
    /// Used for manual triggers and tests.
    FireNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<StorageResult<FanoutReport>>,
    },

    /// Fire once, independent of the recurring schedule, without waiting for the result
    ///
    /// Sent when a monitor registers with `immediate` set.
    FireOnce,

    /// Stop future firings
    ///
    /// A firing that is already running completes first.
    Shutdown,
}

/// Commands that can be sent to the JobRegistryActor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Ensure a job exists for the key, optionally firing once right away
    Register {
        key: DedupKey,
        monitor_id: String,
        immediate: bool,
        respond_to: oneshot::Sender<RegisterOutcome>,
    },

    /// Drop the job for the key if no other monitor uses it
    Unregister {
        key: DedupKey,
        monitor_id: String,
        respond_to: oneshot::Sender<StorageResult<UnregisterOutcome>>,
    },

    /// Sent by a job whose firing found no monitors on its key
    ///
    /// The registry re-checks the key and cancels the job if it is still
    /// unused. This catches members removed concurrently, where each
    /// unregister still saw the other member.
    Reap { key: DedupKey },

    /// Get a trigger for the key's job, if one exists
    Trigger {
        key: DedupKey,
        respond_to: oneshot::Sender<Option<JobTrigger>>,
    },

    /// List the keys that currently have a job
    ActiveKeys {
        respond_to: oneshot::Sender<Vec<DedupKey>>,
    },

    /// Stop every job and the registry itself
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Result of registering a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// A new job was created for the key
    Created,

    /// The key already had a job; the monitor shares it
    Joined,

    /// The registry is not running, nothing was scheduled
    Inactive,
}

/// Result of unregistering a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisterOutcome {
    /// Other monitors still use the key, the job keeps running
    Retained { remaining: usize },

    /// The monitor was the last user, the job was cancelled
    Cancelled,

    /// No job existed for the key
    NotScheduled,

    /// The registry is not running, nothing was changed
    Inactive,
}
