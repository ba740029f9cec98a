// src/storage/sqlite.rs

//! SQLite task ledger.
//!
//! Claims are a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE`
//! statement: a fresh key inserts, a key returned by [`reset_failed`] is
//! taken back exactly once, and anything else changes no row. Transitions
//! are conditional updates on the expected previous status, so a lost race
//! or an illegal move shows up as zero affected rows.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text so that string
//! comparison in SQL orders them correctly.
//!
//! [`reset_failed`]: ClaimStore::reset_failed

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::{AppError, Result};
use crate::models::{
    ClaimOutcome, FailedStep, IngestionTask, SettingKey, SkipReason, TaskKey, TaskStatus,
};
use crate::storage::{ClaimStore, ERROR_DETAIL_BUDGET};
use crate::utils::truncate_chars;

/// Quoted status literals for an `IN (...)` list.
fn status_list(statuses: &[TaskStatus]) -> String {
    statuses
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows stuck in flight. A requeued claim is waiting for its reclaim, not stuck.
static IN_FLIGHT_FILTER: LazyLock<String> = LazyLock::new(|| {
    let clauses: Vec<String> = TaskStatus::in_flight()
        .iter()
        .map(|status| match status {
            TaskStatus::Claimed => format!("(status = '{status}' AND requeued = 0)"),
            other => format!("status = '{other}'"),
        })
        .collect();
    format!("({})", clauses.join(" OR "))
});

static STALLED_STEP_CASE: LazyLock<String> = LazyLock::new(|| {
    let arms: String = TaskStatus::in_flight()
        .iter()
        .filter_map(|status| {
            status
                .stalled_step()
                .map(|step| format!(" WHEN '{status}' THEN '{step}'"))
        })
        .collect();
    format!("CASE status{arms} END")
});

/// SQLite-backed claim store.
#[derive(Clone)]
pub struct SqliteClaimStore {
    pool: SqlitePool,
}

impl SqliteClaimStore {
    /// Connect to a database URL such as `sqlite://ingestor.db`.
    ///
    /// The file is created when missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Open a database file directly.
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Create an in-memory ledger (for testing).
    ///
    /// A single connection that never idles out, since each connection
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create tables when missing.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingestion_tasks (
                external_id TEXT NOT NULL,
                source_tag TEXT NOT NULL,
                status TEXT NOT NULL,
                requeued INTEGER NOT NULL DEFAULT 0,
                document_url TEXT,
                failed_step TEXT,
                error_detail TEXT,
                skip_reason TEXT,
                skip_metadata TEXT,
                note TEXT,
                notified_at TEXT,
                claimed_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (external_id, source_tag)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status_updated
                ON ingestion_tasks(status, updated_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_config (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a runtime setting override.
    pub async fn put_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Explain why a conditional update touched no row.
    async fn rejection(&self, key: &TaskKey, to: TaskStatus) -> AppError {
        match self.get(key).await {
            Ok(Some(task)) => AppError::InvalidTransition {
                key: key.clone(),
                from: task.status,
                to,
            },
            Ok(None) => AppError::TaskNotFound(key.clone()),
            Err(e) => e,
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::store(format!("invalid timestamp '{raw}': {e}")))
}

#[async_trait]
impl ClaimStore for SqliteClaimStore {
    async fn claim(&self, key: &TaskKey, document_url: &str) -> Result<ClaimOutcome> {
        let at = now();
        let result = sqlx::query(
            r#"
            INSERT INTO ingestion_tasks
                (external_id, source_tag, status, requeued, document_url, claimed_at, updated_at)
            VALUES (?1, ?2, 'claimed', 0, ?3, ?4, ?4)
            ON CONFLICT(external_id, source_tag) DO UPDATE
                SET requeued = 0,
                    document_url = excluded.document_url,
                    updated_at = MAX(ingestion_tasks.updated_at, excluded.updated_at)
                WHERE ingestion_tasks.status = 'claimed' AND ingestion_tasks.requeued = 1
            "#,
        )
        .bind(&key.external_id)
        .bind(&key.source_tag)
        .bind(document_url)
        .bind(&at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::AlreadyClaimed)
        }
    }

    async fn advance(&self, key: &TaskKey, to: TaskStatus, note: Option<&str>) -> Result<()> {
        let from = TaskStatus::predecessors_of(to);
        if from.is_empty() || matches!(to, TaskStatus::Failed | TaskStatus::Skipped) {
            return Err(self.rejection(key, to).await);
        }

        let sql = format!(
            "UPDATE ingestion_tasks \
             SET status = ?1, \
                 note = COALESCE(?2, note), \
                 updated_at = MAX(updated_at, ?3) \
             WHERE external_id = ?4 AND source_tag = ?5 AND requeued = 0 \
               AND status IN ({})",
            status_list(&from)
        );
        let result = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(note)
            .bind(now())
            .bind(&key.external_id)
            .bind(&key.source_tag)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejection(key, to).await);
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &TaskKey, step: FailedStep, detail: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_tasks
            SET status = 'failed',
                failed_step = ?1,
                error_detail = ?2,
                updated_at = MAX(updated_at, ?3)
            WHERE external_id = ?4 AND source_tag = ?5 AND status = ?6
            "#,
        )
        .bind(step.as_str())
        .bind(truncate_chars(detail, ERROR_DETAIL_BUDGET))
        .bind(now())
        .bind(&key.external_id)
        .bind(&key.source_tag)
        .bind(step.status().as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejection(key, TaskStatus::Failed).await);
        }
        Ok(())
    }

    async fn mark_skipped(
        &self,
        key: &TaskKey,
        reason: SkipReason,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE ingestion_tasks \
             SET status = ?1, \
                 skip_reason = ?2, \
                 skip_metadata = ?3, \
                 updated_at = MAX(updated_at, ?4) \
             WHERE external_id = ?5 AND source_tag = ?6 AND status IN ({})",
            status_list(&TaskStatus::predecessors_of(TaskStatus::Skipped))
        );
        let result = sqlx::query(&sql)
            .bind(TaskStatus::Skipped.as_str())
            .bind(reason.as_str())
            .bind(serde_json::to_string(metadata)?)
            .bind(now())
            .bind(&key.external_id)
            .bind(&key.source_tag)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejection(key, TaskStatus::Skipped).await);
        }
        Ok(())
    }

    async fn mark_notified(&self, keys: &[TaskKey]) -> Result<u64> {
        let at = now();
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for key in keys {
            let result = sqlx::query(
                r#"
                UPDATE ingestion_tasks
                SET notified_at = ?1
                WHERE external_id = ?2 AND source_tag = ?3
                  AND status = 'ingested' AND notified_at IS NULL
                "#,
            )
            .bind(&at)
            .bind(&key.external_id)
            .bind(&key.source_tag)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn list_unnotified(&self, source_tag: &str) -> Result<Vec<TaskKey>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT external_id, source_tag FROM ingestion_tasks
            WHERE source_tag = ?1 AND status = 'ingested' AND notified_at IS NULL
            ORDER BY updated_at, external_id
            "#,
        )
        .bind(source_tag)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(external_id, source_tag)| TaskKey::new(external_id, source_tag))
            .collect())
    }

    async fn reset_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_tasks
            SET status = 'claimed',
                requeued = 1,
                failed_step = NULL,
                error_detail = NULL,
                updated_at = MAX(updated_at, ?1)
            WHERE status = 'failed'
            "#,
        )
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<IngestionTask>> {
        let sql = format!(
            "SELECT * FROM ingestion_tasks WHERE {} AND updated_at < ?1 \
             ORDER BY updated_at",
            *IN_FLIGHT_FILTER
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&sql)
            .bind(timestamp(cutoff))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "UPDATE ingestion_tasks \
             SET failed_step = {}, \
                 error_detail = 'stale: no progress since ' || updated_at, \
                 status = ?1, \
                 updated_at = MAX(updated_at, ?2) \
             WHERE {} AND updated_at < ?3",
            *STALLED_STEP_CASE, *IN_FLIGHT_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(TaskStatus::Failed.as_str())
            .bind(now())
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, key: &TaskKey) -> Result<Option<IngestionTask>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT * FROM ingestion_tasks WHERE external_id = ?1 AND source_tag = ?2",
        )
        .bind(&key.external_id)
        .bind(&key.source_tag)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TaskRow::into_task).transpose()
    }

    async fn find(&self, external_id: &str) -> Result<Vec<IngestionTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM ingestion_tasks WHERE external_id = ?1 ORDER BY source_tag",
        )
        .bind(external_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn status_counts(&self) -> Result<BTreeMap<String, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM ingestion_tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, count.max(0) as u64))
            .collect())
    }

    async fn setting_overrides(&self) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM app_config WHERE value IS NOT NULL ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct TaskRow {
    external_id: String,
    source_tag: String,
    status: String,
    requeued: bool,
    document_url: Option<String>,
    failed_step: Option<String>,
    error_detail: Option<String>,
    skip_reason: Option<String>,
    skip_metadata: Option<String>,
    note: Option<String>,
    notified_at: Option<String>,
    claimed_at: String,
    updated_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<IngestionTask> {
        Ok(IngestionTask {
            status: self.status.parse().map_err(AppError::store)?,
            failed_step: self
                .failed_step
                .map(|s| s.parse::<FailedStep>())
                .transpose()
                .map_err(AppError::store)?,
            skip_reason: self
                .skip_reason
                .map(|s| s.parse::<SkipReason>())
                .transpose()
                .map_err(AppError::store)?,
            skip_metadata: self
                .skip_metadata
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            notified_at: self
                .notified_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            claimed_at: parse_timestamp(&self.claimed_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            external_id: self.external_id,
            source_tag: self.source_tag,
            requeued: self.requeued,
            document_url: self.document_url,
            error_detail: self.error_detail,
            note: self.note,
        })
    }
}
