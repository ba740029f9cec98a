// src/pipeline/job.rs

//! Polling job: repeats batches over every pass until there is no more
//! work.
//!
//! Each iteration runs one batch per pass with a fresh settings snapshot.
//! The job stops when:
//! - no pass claimed anything (caught up),
//! - no pass filled its batch (the feeds are drained), or
//! - the runtime deadline passed.
//!
//! After a full batch it pauses briefly and polls again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{Config, PassConfig, RunSettings};
use crate::pipeline::runner::{BatchResult, BatchRunner};
use crate::services::{DocumentFetcher, ExtractOptions, Extractor, FeedSource, Notifier};
use crate::storage::{ClaimStore, RecordSink};

/// A configured pass with its feed.
pub struct Pass {
    pub config: PassConfig,
    pub feed: Arc<dyn FeedSource>,
}

/// Why a job run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    CaughtUp,
    PartialBatch,
    Deadline,
}

/// Totals over a job run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSummary {
    pub iterations: usize,
    pub new_count: usize,
    pub ingested_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub stop: StopReason,
}

impl JobSummary {
    fn absorb(&mut self, batch: &BatchResult) {
        self.new_count += batch.new_count;
        self.ingested_count += batch.ingested_count;
        self.failed_count += batch.failed_count;
        self.skipped_count += batch.skipped_count;
    }
}

pub struct IngestJob {
    config: Arc<Config>,
    store: Arc<dyn ClaimStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    sink: Arc<dyn RecordSink>,
    notifier: Arc<dyn Notifier>,
    passes: Vec<Pass>,
}

impl IngestJob {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ClaimStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        sink: Arc<dyn RecordSink>,
        notifier: Arc<dyn Notifier>,
        passes: Vec<Pass>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            sink,
            notifier,
            passes,
        }
    }

    /// Current settings: file configuration plus stored overrides.
    pub async fn settings(&self) -> Result<RunSettings> {
        let overrides = self.store.setting_overrides().await?;
        Ok(RunSettings::resolve(&self.config, &overrides))
    }

    fn runner(&self, pass: &Pass, settings: &RunSettings) -> BatchRunner {
        let options = ExtractOptions::for_pass(&self.config.ingest, &pass.config, settings);
        let extractor = Extractor::new(Arc::clone(&self.fetcher), options);
        let runner = BatchRunner::new(
            &pass.config,
            Arc::clone(&self.store),
            Arc::clone(&pass.feed),
            extractor,
            Arc::clone(&self.sink),
        );
        if settings.notify_enabled {
            runner.with_notifier(Arc::clone(&self.notifier))
        } else {
            runner
        }
    }

    /// Run a single batch for one pass.
    pub async fn run_batch(&self, source_tag: &str, max_items: Option<usize>) -> Result<BatchResult> {
        let pass = self
            .passes
            .iter()
            .find(|p| p.config.source_tag == source_tag)
            .ok_or_else(|| AppError::config(format!("no pass named '{source_tag}'")))?;
        let settings = self.settings().await?;
        let max_items = max_items.unwrap_or(settings.max_new_per_run);
        self.runner(pass, &settings).run_batch(max_items).await
    }

    /// Poll every pass until caught up or out of time.
    pub async fn run(&self) -> Result<JobSummary> {
        let deadline = Instant::now() + Duration::from_secs(self.config.job.max_runtime_mins * 60);
        let pause = Duration::from_secs(self.config.job.pause_between_batches_secs);
        let mut summary = JobSummary::default();

        loop {
            if Instant::now() >= deadline {
                log::warn!("Runtime deadline reached, stopping");
                summary.stop = StopReason::Deadline;
                break;
            }

            let settings = self.settings().await?;
            summary.iterations += 1;
            let mut claimed = 0;
            let mut any_full = false;

            for pass in &self.passes {
                match self.runner(pass, &settings).run_batch(settings.max_new_per_run).await {
                    Ok(batch) => {
                        claimed += batch.new_count;
                        any_full |= batch.new_count >= settings.max_new_per_run;
                        summary.absorb(&batch);
                    }
                    Err(e) if e.is_store_error() => {
                        log::error!("[{}] Ledger failure: {}", pass.config.source_tag, e);
                        return Err(e);
                    }
                    Err(e) => log::error!("[{}] Pass failed: {}", pass.config.source_tag, e),
                }
            }

            if claimed == 0 {
                log::info!("Caught up after {} iteration(s)", summary.iterations);
                summary.stop = StopReason::CaughtUp;
                break;
            }
            if !any_full {
                summary.stop = StopReason::PartialBatch;
                break;
            }

            log::info!("Full batch, polling again in {}s", pause.as_secs());
            tokio::time::sleep(pause).await;
        }

        log::info!(
            "Job done ({:?}): {} new, {} ingested, {} failed, {} skipped",
            summary.stop,
            summary.new_count,
            summary.ingested_count,
            summary.failed_count,
            summary.skipped_count
        );
        Ok(summary)
    }
}
