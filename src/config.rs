use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::monitors::NewMonitor;
use crate::probe::PROBE_TIMEOUT;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (checks older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl StorageConfig {
    /// Retention period, if the backend persists anything
    pub fn retention_days(&self) -> Option<u32> {
        match self {
            StorageConfig::None => None,
            StorageConfig::Sqlite { retention_days, .. } => Some(*retention_days),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./uptime.db")
}

fn default_retention_days() -> u32 {
    30
}

/// Scheduler settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Timeout for a single probe request
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Probe every persisted monitor once right after startup
    #[serde(default)]
    pub probe_on_startup: bool,

    /// How often retention cleanup runs
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u32,
}

impl SchedulerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.max(1) as u64 * 3600)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_on_startup: false,
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    PROBE_TIMEOUT.as_secs()
}

fn default_cleanup_interval_hours() -> u32 {
    24
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to SQLite at ./uptime.db)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Monitors to create on startup if they don't exist yet
    pub monitors: Option<Vec<NewMonitor>>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
