// src/pipeline/admin.rs

//! Administrative operations on the ledger.
//!
//! These are the only ways a task leaves a terminal status, and none of
//! them run automatically.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};

use crate::error::Result;
use crate::models::{IngestionTask, TaskKey};
use crate::storage::ClaimStore;

/// Requeue every failed task for the next batch.
pub async fn reset_failed(store: &dyn ClaimStore) -> Result<u64> {
    let count = store.reset_failed().await?;
    log::info!("Reset {} failed task(s) to claimed", count);
    Ok(count)
}

/// Tasks for an external id, optionally limited to one source tag.
pub async fn task_status(
    store: &dyn ClaimStore,
    external_id: &str,
    source_tag: Option<&str>,
) -> Result<Vec<IngestionTask>> {
    match source_tag {
        Some(tag) => Ok(store
            .get(&TaskKey::new(external_id, tag))
            .await?
            .into_iter()
            .collect()),
        None => store.find(external_id).await,
    }
}

/// In-flight tasks with no progress for `older_than`.
pub async fn stale_tasks(store: &dyn ClaimStore, older_than: Duration) -> Result<Vec<IngestionTask>> {
    let tasks = store.list_stale(Utc::now() - older_than).await?;
    for task in &tasks {
        log::warn!(
            "Stale: {} stuck in {} since {}",
            task.key(),
            task.status,
            task.updated_at
        );
    }
    Ok(tasks)
}

/// Fail stale tasks so a later reset can retry them.
pub async fn fail_stale(store: &dyn ClaimStore, older_than: Duration) -> Result<u64> {
    let count = store.fail_stale(Utc::now() - older_than).await?;
    log::info!("Marked {} stale task(s) failed", count);
    Ok(count)
}

pub async fn status_counts(store: &dyn ClaimStore) -> Result<BTreeMap<String, u64>> {
    store.status_counts().await
}

/// One-line rendering of a task.
pub fn describe_task(task: &IngestionTask) -> String {
    let mut line = format!(
        "{} {} (updated {})",
        task.key(),
        task.status,
        task.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if task.requeued {
        line.push_str(" [requeued]");
    }
    if let (Some(step), Some(detail)) = (task.failed_step, &task.error_detail) {
        line.push_str(&format!(" failed while {step}: {detail}"));
    }
    if let Some(reason) = task.skip_reason {
        line.push_str(&format!(" skipped: {reason}"));
        if let Some(metadata) = &task.skip_metadata {
            line.push_str(&format!(" {metadata}"));
        }
    }
    if let Some(note) = &task.note {
        line.push_str(&format!(" ({note})"));
    }
    line
}
