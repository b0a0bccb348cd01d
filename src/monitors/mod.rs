//! Monitor management
//!
//! [`MonitorService`] is the surface that request handlers (or the hub's
//! config seeding) call into. It allocates slugs, persists monitors and keeps
//! the job registry in sync with what is stored.

pub mod service;
pub mod slug;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dedup::UrlError;
use crate::storage::StorageError;

pub use service::{MonitorService, MonitorSummary, StatusSnapshot, SummaryRange};

/// Smallest allowed probe interval in seconds
pub const MIN_INTERVAL_SECS: u32 = 10;

/// Largest allowed probe interval in seconds
pub const MAX_INTERVAL_SECS: u32 = 3600;

/// Request to create a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,

    /// Target URL, normalized on creation
    pub url: String,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default)]
    pub owner: Option<String>,
}

impl NewMonitor {
    /// A monitor with the default interval (60s) and expected status (200)
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval_secs: default_interval_secs(),
            expected_status: default_expected_status(),
            owner: None,
        }
    }

    pub fn with_interval(mut self, interval_secs: u32) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    pub fn with_expected_status(mut self, expected_status: u16) -> Self {
        self.expected_status = expected_status;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

fn default_interval_secs() -> u32 {
    60
}

fn default_expected_status() -> u16 {
    200
}

/// Errors returned by [`MonitorService`]
#[derive(Debug)]
pub enum MonitorError {
    /// The target URL cannot be probed
    InvalidUrl(UrlError),

    /// Interval outside of 10-3600 seconds
    InvalidInterval(u32),

    /// No monitor with this id or slug
    NotFound(String),

    /// Every slug candidate was taken by a concurrent creation
    SlugConflict { slug: String, attempts: usize },

    Storage(StorageError),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::InvalidUrl(e) => write!(f, "{}", e),
            MonitorError::InvalidInterval(secs) => write!(
                f,
                "interval must be between {} and {} seconds, got {}",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, secs
            ),
            MonitorError::NotFound(what) => write!(f, "monitor not found: {}", what),
            MonitorError::SlugConflict { slug, attempts } => write!(
                f,
                "could not allocate a slug (last tried '{}') after {} attempts",
                slug, attempts
            ),
            MonitorError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::InvalidUrl(e) => Some(e),
            MonitorError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<UrlError> for MonitorError {
    fn from(err: UrlError) -> Self {
        MonitorError::InvalidUrl(err)
    }
}

impl From<StorageError> for MonitorError {
    fn from(err: StorageError) -> Self {
        MonitorError::Storage(err)
    }
}
