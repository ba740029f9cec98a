// src/storage/mod.rs

//! Storage abstractions for the task ledger and extracted records.
//!
//! ## Layout
//!
//! ```text
//! ingestor.db               # Ledger: ingestion_tasks + app_config (SQLite)
//! records/                  # Extracted records, one file per filing
//! ├── summary/
//! │   └── 1900001.json
//! └── itemized/
//!     └── 1900007.json
//! ```

pub mod local;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ClaimOutcome, ExtractedRecord, ExtractionKind, FailedStep, IngestionTask, SkipReason, TaskKey,
    TaskStatus,
};

// Re-export for convenience
pub use local::JsonRecordSink;
pub use sqlite::SqliteClaimStore;

/// Longest error detail kept on a task.
pub const ERROR_DETAIL_BUDGET: usize = 500;

/// Durable ledger of every work item ever claimed.
///
/// The ledger is the single source of truth for task status. Every method
/// is atomic on its own; callers never need a prior read to stay correct.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Claim a work item. Exactly one concurrent caller gets
    /// [`ClaimOutcome::Claimed`]; the rest get `AlreadyClaimed`.
    async fn claim(&self, key: &TaskKey, document_url: &str) -> Result<ClaimOutcome>;

    /// Move a task one step along the forward path.
    async fn advance(&self, key: &TaskKey, to: TaskStatus, note: Option<&str>) -> Result<()>;

    async fn mark_failed(&self, key: &TaskKey, step: FailedStep, detail: &str) -> Result<()>;

    async fn mark_skipped(
        &self,
        key: &TaskKey,
        reason: SkipReason,
        metadata: &serde_json::Value,
    ) -> Result<()>;

    /// Stamp `notified_at` on ingested tasks that have none yet.
    async fn mark_notified(&self, keys: &[TaskKey]) -> Result<u64>;

    /// Ingested tasks of one source that no notification has covered yet,
    /// oldest first.
    async fn list_unnotified(&self, source_tag: &str) -> Result<Vec<TaskKey>>;

    /// Return every failed task to `claimed` so the next batch retries it.
    async fn reset_failed(&self) -> Result<u64>;

    /// In-flight tasks whose last update is older than `cutoff`.
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<IngestionTask>>;

    /// Mark stale in-flight tasks failed at the phase they were stuck in.
    async fn fail_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn get(&self, key: &TaskKey) -> Result<Option<IngestionTask>>;

    /// Every task for an external id, across source tags.
    async fn find(&self, external_id: &str) -> Result<Vec<IngestionTask>>;

    async fn status_counts(&self) -> Result<BTreeMap<String, u64>>;

    /// Raw runtime setting rows.
    async fn setting_overrides(&self) -> Result<Vec<(String, String)>>;
}

/// Destination for extracted records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist a record. Saving the same external id twice overwrites.
    async fn save(&self, record: &ExtractedRecord) -> Result<()>;

    /// Read back a saved record, `None` when nothing was saved for the id.
    async fn load(
        &self,
        kind: ExtractionKind,
        external_id: &str,
    ) -> Result<Option<ExtractedRecord>>;
}
