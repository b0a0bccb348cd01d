//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Schema created from `./migrations` with sqlx
//! - **Cascades**: Foreign keys are enforced, deleting a monitor removes its history
//!
//! ## Transactions
//!
//! `record_check` starts with the INSERT so the write lock is taken up front;
//! the open-incident lookup and the incident update then run under that lock.
//! A partial unique index backs the "one open incident per monitor" rule.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    CheckRow, CheckSummary, IncidentRow, IncidentTransition, MonitorRow, NewCheck, RecordedCheck,
};
use crate::dedup::DedupKey;
use crate::incidents::{self, IncidentAction, IncidentState};

const MONITOR_COLUMNS: &str =
    "id, slug, name, url, interval_secs, expected_status, owner, created_at";

const CHECK_COLUMNS: &str = "id, monitor_id, status_code, ok, latency_ms, observed_at";

const INCIDENT_COLUMNS: &str =
    "id, monitor_id, opened_at, resolved_at, reason, last_status_code";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent access (WAL mode, busy timeout)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use uptime_monitoring::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./uptime.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn monitor_from_row(row: &SqliteRow) -> StorageResult<MonitorRow> {
        Ok(MonitorRow {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            interval_secs: row.try_get::<i64, _>("interval_secs")? as u32,
            expected_status: row.try_get::<i64, _>("expected_status")? as u16,
            owner: row.try_get("owner")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn check_from_row(row: &SqliteRow) -> StorageResult<CheckRow> {
        Ok(CheckRow {
            id: row.try_get("id")?,
            monitor_id: row.try_get("monitor_id")?,
            status_code: row
                .try_get::<Option<i64>, _>("status_code")?
                .map(|v| v as u16),
            ok: row.try_get("ok")?,
            latency_ms: row
                .try_get::<Option<i64>, _>("latency_ms")?
                .map(|v| v as u64),
            observed_at: Self::millis_to_timestamp(row.try_get("observed_at")?),
        })
    }

    fn incident_from_row(row: &SqliteRow) -> StorageResult<IncidentRow> {
        Ok(IncidentRow {
            id: row.try_get("id")?,
            monitor_id: row.try_get("monitor_id")?,
            opened_at: Self::millis_to_timestamp(row.try_get("opened_at")?),
            resolved_at: row
                .try_get::<Option<i64>, _>("resolved_at")?
                .map(Self::millis_to_timestamp),
            reason: row.try_get("reason")?,
            last_status_code: row
                .try_get::<Option<i64>, _>("last_status_code")?
                .map(|v| v as u16),
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, monitor), fields(slug = %monitor.slug))]
    async fn insert_monitor(&self, monitor: &MonitorRow) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO monitors (
                id, slug, name, url, interval_secs, expected_status, owner, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&monitor.id)
        .bind(&monitor.slug)
        .bind(&monitor.name)
        .bind(&monitor.url)
        .bind(monitor.interval_secs as i64)
        .bind(monitor.expected_status as i64)
        .bind(&monitor.owner)
        .bind(Self::timestamp_to_millis(&monitor.created_at))
        .execute(&self.pool)
        .await?;

        debug!("inserted monitor {}", monitor.id);
        Ok(())
    }

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRow>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::monitor_from_row).transpose()
    }

    async fn get_monitor_by_slug(&self, slug: &str) -> StorageResult<Option<MonitorRow>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE slug = ?");
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::monitor_from_row).transpose()
    }

    async fn list_monitors(&self) -> StorageResult<Vec<MonitorRow>> {
        let sql =
            format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY created_at DESC, rowid DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::monitor_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn delete_monitor(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn monitors_for_key(&self, key: &DedupKey) -> StorageResult<Vec<MonitorRow>> {
        let sql = format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE url = ? AND interval_secs = ? ORDER BY rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(key.url())
            .bind(key.interval_secs() as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::monitor_from_row).collect()
    }

    async fn slugs_matching(&self, base: &str) -> StorageResult<Vec<String>> {
        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM monitors WHERE slug = ? OR slug LIKE ?")
            .bind(base)
            .bind(format!("{base}-%"))
            .fetch_all(&self.pool)
            .await?;

        Ok(slugs)
    }

    #[instrument(skip(self, check), fields(monitor_id = %check.monitor_id, ok = check.ok))]
    async fn record_check(&self, check: NewCheck) -> StorageResult<RecordedCheck> {
        let observed_millis = Self::timestamp_to_millis(&check.observed_at);

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO checks (monitor_id, status_code, ok, latency_ms, observed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&check.monitor_id)
        .bind(check.status_code.map(i64::from))
        .bind(check.ok)
        .bind(check.latency_ms.map(|v| v as i64))
        .bind(observed_millis)
        .execute(&mut *tx)
        .await?;

        let check_id = inserted.last_insert_rowid();

        let row = CheckRow {
            id: check_id,
            monitor_id: check.monitor_id.clone(),
            status_code: check.status_code,
            ok: check.ok,
            latency_ms: check.latency_ms,
            observed_at: Self::millis_to_timestamp(observed_millis),
        };

        let previous: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(observed_at) FROM checks WHERE monitor_id = ? AND id < ?",
        )
        .bind(&check.monitor_id)
        .bind(check_id)
        .fetch_one(&mut *tx)
        .await?;

        if previous.is_some_and(|latest| observed_millis < latest) {
            debug!("check is older than the latest one, incident state kept");
            tx.commit().await?;
            return Ok(RecordedCheck {
                check: row,
                transition: IncidentTransition::Unchanged,
            });
        }

        let open: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM incidents WHERE monitor_id = ? AND resolved_at IS NULL LIMIT 1",
        )
        .bind(&check.monitor_id)
        .fetch_optional(&mut *tx)
        .await?;

        let state = match open {
            Some(incident_id) => IncidentState::Open { incident_id },
            None => IncidentState::Closed,
        };

        let transition = match incidents::evaluate(state, &check) {
            IncidentAction::Open {
                reason,
                last_status_code,
            } => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO incidents (monitor_id, opened_at, resolved_at, reason, last_status_code)
                    VALUES (?, ?, NULL, ?, ?)
                    "#,
                )
                .bind(&check.monitor_id)
                .bind(observed_millis)
                .bind(reason)
                .bind(last_status_code.map(i64::from))
                .execute(&mut *tx)
                .await?;

                IncidentTransition::Opened {
                    incident_id: result.last_insert_rowid(),
                }
            }
            IncidentAction::Resolve {
                incident_id,
                resolved_at,
            } => {
                sqlx::query("UPDATE incidents SET resolved_at = ? WHERE id = ?")
                    .bind(Self::timestamp_to_millis(&resolved_at))
                    .bind(incident_id)
                    .execute(&mut *tx)
                    .await?;

                IncidentTransition::Resolved { incident_id }
            }
            IncidentAction::None => IncidentTransition::Unchanged,
        };

        tx.commit().await?;

        Ok(RecordedCheck {
            check: row,
            transition,
        })
    }

    #[instrument(skip(self))]
    async fn query_latest_checks(
        &self,
        monitor_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        let sql = format!(
            r#"
            SELECT {CHECK_COLUMNS}
            FROM checks
            WHERE monitor_id = ?
            ORDER BY observed_at DESC, id DESC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(monitor_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut checks: Vec<CheckRow> = rows
            .iter()
            .map(Self::check_from_row)
            .collect::<StorageResult<_>>()?;
        // Reverse to get chronological order (oldest first)
        checks.reverse();
        Ok(checks)
    }

    async fn open_incident(&self, monitor_id: &str) -> StorageResult<Option<IncidentRow>> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = ? AND resolved_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(monitor_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::incident_from_row).transpose()
    }

    async fn list_incidents(&self, monitor_id: &str) -> StorageResult<Vec<IncidentRow>> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = ? ORDER BY opened_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(monitor_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::incident_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn summarize_checks(
        &self,
        monitor_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckSummary> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS samples,
                   COALESCE(SUM(ok), 0) AS ok_count,
                   AVG(latency_ms) AS avg_latency
            FROM checks
            WHERE monitor_id = ? AND observed_at >= ?
            "#,
        )
        .bind(monitor_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_one(&self.pool)
        .await?;

        let last_ok: Option<bool> = sqlx::query_scalar(
            "SELECT ok FROM checks WHERE monitor_id = ? ORDER BY observed_at DESC, id DESC LIMIT 1",
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(CheckSummary {
            samples: row.try_get::<i64, _>("samples")? as u64,
            ok_count: row.try_get::<i64, _>("ok_count")? as u64,
            avg_latency_ms: row.try_get("avg_latency")?,
            last_ok,
        })
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_checks(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM checks WHERE observed_at < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old checks", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        // Simple ping query to verify connection
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let monitors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitors")
            .fetch_one(&self.pool)
            .await?;

        let checks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checks")
            .fetch_one(&self.pool)
            .await?;

        let open_incidents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE resolved_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let file_size_mb = file_size as f64 / 1_000_000.0;

        Ok(format!(
            "SQLite: {} monitors, {} checks, {} open incidents, {:.2} MB on disk",
            monitors, checks, open_incidents, file_size_mb
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
