// src/pipeline/runner.rs

//! Batch runner: feed → claim → extract → persist, one item at a time.
//!
//! A batch walks the feed newest-first and stops at whichever comes first:
//! - the feed runs out,
//! - an item older than the processing window,
//! - `max_items` newly claimed items.
//!
//! Item-scoped failures are written to the ledger and the batch carries on.
//! Ledger errors abort the batch.
//!
//! Notification works off the ledger rather than the batch: every ingested
//! task of the pass without `notified_at` is reported, so records missed by
//! an earlier failed notification or an aborted batch go out with the next one.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde_json::json;

use crate::error::{ExtractError, Result};
use crate::models::{
    ExtractionKind, FailedStep, PassConfig, ProcessingWindow, SkipReason, TaskKey, TaskStatus,
    WorkItem,
};
use crate::services::{Extractor, FeedSource, Notifier};
use crate::storage::{ClaimStore, RecordSink};

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Items this batch claimed, whatever became of them
    pub new_count: usize,
    pub ingested_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    /// Items another run had already claimed
    pub already_claimed: usize,
    /// Stopped on an item older than the processing window
    pub reached_window_end: bool,
    /// Stopped on the per-batch cap
    pub hit_cap: bool,
    /// Tasks stamped as notified
    pub notified_count: usize,
    pub last_error: Option<String>,
}

impl BatchResult {
    /// Nothing new was claimed.
    pub fn caught_up(&self) -> bool {
        self.new_count == 0
    }
}

enum ItemOutcome {
    Ingested,
    Failed(String),
    Skipped,
}

/// Runs batches for a single pass.
pub struct BatchRunner {
    source_tag: String,
    kind: ExtractionKind,
    window: ProcessingWindow,
    store: Arc<dyn ClaimStore>,
    feed: Arc<dyn FeedSource>,
    extractor: Extractor,
    sink: Arc<dyn RecordSink>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl BatchRunner {
    pub fn new(
        pass: &PassConfig,
        store: Arc<dyn ClaimStore>,
        feed: Arc<dyn FeedSource>,
        extractor: Extractor,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            source_tag: pass.source_tag.clone(),
            kind: pass.strategy,
            window: pass.window,
            store,
            feed,
            extractor,
            sink,
            notifier: None,
        }
    }

    /// Hand not-yet-notified records to `notifier` after each batch.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Process candidates until caught up, out of window, or `max_items`
    /// newly claimed.
    pub async fn run_batch(&self, max_items: usize) -> Result<BatchResult> {
        let window_start = self.window.start(Utc::now());
        let mut result = BatchResult::default();
        let mut candidates = self.feed.list_candidates().await?;

        while let Some(item) = candidates.next().await {
            if let (Some(start), Some(published)) = (window_start, item.published_at) {
                if published < start {
                    log::debug!(
                        "[{}] {} published {} is before window start, stopping",
                        self.source_tag,
                        item.external_id,
                        published
                    );
                    result.reached_window_end = true;
                    break;
                }
            }
            if result.new_count >= max_items {
                log::info!(
                    "[{}] Reached cap of {} new items",
                    self.source_tag,
                    max_items
                );
                result.hit_cap = true;
                break;
            }

            let key = TaskKey::new(&item.external_id, &self.source_tag);
            if !self.store.claim(&key, &item.document_url).await?.is_claimed() {
                result.already_claimed += 1;
                continue;
            }
            result.new_count += 1;

            match self.process(&key, &item).await? {
                ItemOutcome::Ingested => result.ingested_count += 1,
                ItemOutcome::Failed(detail) => {
                    result.failed_count += 1;
                    result.last_error = Some(detail);
                }
                ItemOutcome::Skipped => result.skipped_count += 1,
            }
        }
        drop(candidates);

        result.notified_count = self.notify().await?;

        log::info!(
            "[{}] Batch done: {} new, {} ingested, {} failed, {} skipped, {} already claimed",
            self.source_tag,
            result.new_count,
            result.ingested_count,
            result.failed_count,
            result.skipped_count,
            result.already_claimed
        );
        Ok(result)
    }

    /// Drive one claimed task to a terminal status.
    async fn process(&self, key: &TaskKey, item: &WorkItem) -> Result<ItemOutcome> {
        self.store
            .advance(key, TaskStatus::Downloading, None)
            .await?;

        let document = match self.extractor.download(item).await {
            Ok(document) => document,
            Err(ExtractError::TooLarge {
                size_bytes,
                limit_bytes,
                declared,
            }) => {
                log::warn!(
                    "[{}] Skipping {}: {} bytes exceeds limit of {} bytes",
                    self.source_tag,
                    item.external_id,
                    size_bytes,
                    limit_bytes
                );
                let metadata = json!({
                    "size_bytes": size_bytes,
                    "limit_bytes": limit_bytes,
                    "declared": declared,
                    "document_url": item.document_url,
                });
                self.store
                    .mark_skipped(key, SkipReason::TooLarge, &metadata)
                    .await?;
                return Ok(ItemOutcome::Skipped);
            }
            Err(e) => {
                let step = e.failed_step().unwrap_or(FailedStep::Downloading);
                return self.fail(key, step, e.to_string()).await;
            }
        };

        self.store
            .advance(key, TaskStatus::Downloaded, None)
            .await?;
        self.store.advance(key, TaskStatus::Parsing, None).await?;

        let record = match self.extractor.parse(item, document) {
            Ok(record) => record,
            Err(e) => return self.fail(key, FailedStep::Parsing, e.to_string()).await,
        };

        if let Err(e) = self.sink.save(&record).await {
            return self
                .fail(key, FailedStep::Parsing, format!("persist failed: {e}"))
                .await;
        }

        self.store
            .advance(key, TaskStatus::Ingested, Some(&record.describe()))
            .await?;
        log::info!("[{}] Ingested {}", self.source_tag, item.external_id);
        Ok(ItemOutcome::Ingested)
    }

    async fn fail(&self, key: &TaskKey, step: FailedStep, detail: String) -> Result<ItemOutcome> {
        log::warn!("[{}] {} failed while {}: {}", self.source_tag, key.external_id, step, detail);
        self.store.mark_failed(key, step, &detail).await?;
        Ok(ItemOutcome::Failed(detail))
    }

    /// Report every ingested record of this pass not yet notified.
    /// Notifier failures are logged, not raised, and leave the backlog for
    /// the next batch.
    async fn notify(&self) -> Result<usize> {
        let Some(notifier) = &self.notifier else {
            return Ok(0);
        };

        let pending = self.store.list_unnotified(&self.source_tag).await?;
        let mut keys = Vec::with_capacity(pending.len());
        let mut records = Vec::with_capacity(pending.len());
        for key in pending {
            match self.sink.load(self.kind, &key.external_id).await {
                Ok(Some(record)) if record.source_tag() == self.source_tag => {
                    records.push(record);
                    keys.push(key);
                }
                Ok(_) => log::warn!("[{}] No saved record for {}", self.source_tag, key),
                Err(e) => log::warn!("[{}] Could not load {}: {}", self.source_tag, key, e),
            }
        }
        if records.is_empty() {
            return Ok(0);
        }

        match notifier.notify(&self.source_tag, &records).await {
            Ok(()) => Ok(self.store.mark_notified(&keys).await? as usize),
            Err(e) => {
                log::warn!("[{}] Notification failed: {}", self.source_tag, e);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use futures::stream;
    use tempfile::TempDir;

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::DateTime;

    use crate::error::AppError;
    use crate::models::{ClaimOutcome, Config, ExtractedRecord, IngestionTask};
    use crate::services::Candidates;
    use crate::services::extractor::tests::{
        MemoryFetcher, SUMMARY_DOC, itemized_doc, options, work_item,
    };
    use crate::storage::{JsonRecordSink, SqliteClaimStore};

    /// Feed serving a fixed list of items.
    pub(crate) struct StaticFeed {
        pub items: Mutex<Vec<WorkItem>>,
    }

    impl StaticFeed {
        pub fn new(items: Vec<WorkItem>) -> Self {
            Self {
                items: Mutex::new(items),
            }
        }
    }

    #[async_trait]
    impl FeedSource for StaticFeed {
        async fn list_candidates(&self) -> Result<Candidates> {
            let items = self.items.lock().unwrap().clone();
            Ok(stream::iter(items).boxed())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn delivered(&self) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, ids)| ids.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, source_tag: &str, records: &[ExtractedRecord]) -> Result<()> {
            let ids = records.iter().map(|r| r.external_id().to_string()).collect();
            self.calls
                .lock()
                .unwrap()
                .push((source_tag.to_string(), ids));
            if self.fail {
                return Err(AppError::config("smtp unreachable"));
            }
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl RecordSink for BrokenSink {
        async fn save(&self, _record: &ExtractedRecord) -> Result<()> {
            Err(AppError::Io(std::io::Error::other("disk full")))
        }

        async fn load(
            &self,
            _kind: ExtractionKind,
            _external_id: &str,
        ) -> Result<Option<ExtractedRecord>> {
            Ok(None)
        }
    }

    /// Ledger whose `fail_on_claim`-th claim (1-based) errors out.
    struct FlakyStore {
        inner: Arc<SqliteClaimStore>,
        claims: AtomicUsize,
        fail_on_claim: usize,
    }

    impl FlakyStore {
        fn new(inner: Arc<SqliteClaimStore>, fail_on_claim: usize) -> Self {
            Self {
                inner,
                claims: AtomicUsize::new(0),
                fail_on_claim,
            }
        }
    }

    #[async_trait]
    impl ClaimStore for FlakyStore {
        async fn claim(&self, key: &TaskKey, document_url: &str) -> Result<ClaimOutcome> {
            if self.claims.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on_claim {
                return Err(AppError::store("database is locked"));
            }
            self.inner.claim(key, document_url).await
        }

        async fn advance(&self, key: &TaskKey, to: TaskStatus, note: Option<&str>) -> Result<()> {
            self.inner.advance(key, to, note).await
        }

        async fn mark_failed(&self, key: &TaskKey, step: FailedStep, detail: &str) -> Result<()> {
            self.inner.mark_failed(key, step, detail).await
        }

        async fn mark_skipped(
            &self,
            key: &TaskKey,
            reason: SkipReason,
            metadata: &serde_json::Value,
        ) -> Result<()> {
            self.inner.mark_skipped(key, reason, metadata).await
        }

        async fn mark_notified(&self, keys: &[TaskKey]) -> Result<u64> {
            self.inner.mark_notified(keys).await
        }

        async fn list_unnotified(&self, source_tag: &str) -> Result<Vec<TaskKey>> {
            self.inner.list_unnotified(source_tag).await
        }

        async fn reset_failed(&self) -> Result<u64> {
            self.inner.reset_failed().await
        }

        async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<IngestionTask>> {
            self.inner.list_stale(cutoff).await
        }

        async fn fail_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
            self.inner.fail_stale(cutoff).await
        }

        async fn get(&self, key: &TaskKey) -> Result<Option<IngestionTask>> {
            self.inner.get(key).await
        }

        async fn find(&self, external_id: &str) -> Result<Vec<IngestionTask>> {
            self.inner.find(external_id).await
        }

        async fn status_counts(&self) -> Result<BTreeMap<String, u64>> {
            self.inner.status_counts().await
        }

        async fn setting_overrides(&self) -> Result<Vec<(String, String)>> {
            self.inner.setting_overrides().await
        }
    }

    pub(crate) fn header_items(ids: &[&str]) -> Vec<WorkItem> {
        ids.iter()
            .map(|id| work_item(id, ExtractionKind::HeaderOnly))
            .collect()
    }

    pub(crate) fn fetcher_for(items: &[WorkItem], body: &str) -> MemoryFetcher {
        items
            .iter()
            .fold(MemoryFetcher::default(), |f, item| f.with(&item.document_url, body))
    }

    struct Harness {
        store: Arc<SqliteClaimStore>,
        tmp: TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            Self {
                store: Arc::new(SqliteClaimStore::in_memory().await.unwrap()),
                tmp: TempDir::new().unwrap(),
            }
        }

        fn sink(&self) -> Arc<JsonRecordSink> {
            Arc::new(JsonRecordSink::new(self.tmp.path()))
        }

        fn runner(&self, pass: &PassConfig, items: Vec<WorkItem>, fetcher: MemoryFetcher) -> BatchRunner {
            let extractor = Extractor::new(Arc::new(fetcher), options(&pass.source_tag));
            BatchRunner::new(
                pass,
                self.store.clone(),
                Arc::new(StaticFeed::new(items)),
                extractor,
                self.sink(),
            )
        }

        async fn status(&self, id: &str, tag: &str) -> TaskStatus {
            self.store
                .get(&TaskKey::new(id, tag))
                .await
                .unwrap()
                .unwrap()
                .status
        }
    }

    fn header_pass() -> PassConfig {
        let mut pass = Config::default().passes[0].clone();
        pass.window = ProcessingWindow::All;
        pass
    }

    fn itemized_pass() -> PassConfig {
        Config::default().passes[1].clone()
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let h = Harness::new().await;
        let items = header_items(&["1", "2", "3", "4", "5"]);
        let fetcher = fetcher_for(&items, SUMMARY_DOC).with(&items[2].document_url, "garbage");
        let runner = h.runner(&header_pass(), items, fetcher);

        let result = runner.run_batch(50).await.unwrap();
        assert_eq!(result.new_count, 5);
        assert_eq!(result.ingested_count, 4);
        assert_eq!(result.failed_count, 1);
        assert!(result.last_error.is_some_and(|e| e.contains("parse failed")));

        let task = h.store.get(&TaskKey::new("3", "F3X")).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failed_step, Some(FailedStep::Parsing));
        for id in ["1", "2", "4", "5"] {
            assert_eq!(h.status(id, "F3X").await, TaskStatus::Ingested);
            assert!(h.tmp.path().join(format!("summary/{id}.json")).exists());
        }
    }

    #[tokio::test]
    async fn test_per_run_cap() {
        let h = Harness::new().await;
        let items = header_items(&["1", "2", "3", "4", "5", "6", "7"]);
        let fetcher = fetcher_for(&items, SUMMARY_DOC);
        let runner = h.runner(&header_pass(), items, fetcher);

        let first = runner.run_batch(3).await.unwrap();
        assert_eq!(first.new_count, 3);
        assert!(first.hit_cap);

        let second = runner.run_batch(3).await.unwrap();
        assert_eq!(second.new_count, 3);
        assert_eq!(second.already_claimed, 3);

        let third = runner.run_batch(3).await.unwrap();
        assert_eq!(third.new_count, 1);
        assert!(!third.hit_cap);

        let fourth = runner.run_batch(3).await.unwrap();
        assert!(fourth.caught_up());
        assert_eq!(fourth.already_claimed, 7);
    }

    #[tokio::test]
    async fn test_oversized_document_is_skipped() {
        let h = Harness::new().await;
        let items = vec![work_item("9", ExtractionKind::FullItemized)];
        let huge = itemized_doc().repeat(64);
        let fetcher = fetcher_for(&items, &huge);

        let pass = itemized_pass();
        let mut opts = options(&pass.source_tag);
        opts.max_document_bytes = 1024;
        let runner = BatchRunner::new(
            &pass,
            h.store.clone(),
            Arc::new(StaticFeed::new(items)),
            Extractor::new(Arc::new(fetcher), opts),
            h.sink(),
        );

        let result = runner.run_batch(10).await.unwrap();
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.ingested_count, 0);

        let task = h.store.get(&TaskKey::new("9", "IE")).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Skipped);
        assert_eq!(task.skip_reason, Some(SkipReason::TooLarge));
        let metadata = task.skip_metadata.unwrap();
        assert_eq!(metadata["limit_bytes"], 1024);
        assert!(metadata["size_bytes"].as_u64().unwrap() > 1024);
        assert!(!h.tmp.path().join("itemized/9.json").exists());
    }

    #[tokio::test]
    async fn test_full_itemized_batch_persists_lines() {
        let h = Harness::new().await;
        let items = vec![work_item("7", ExtractionKind::FullItemized)];
        let fetcher = fetcher_for(&items, &itemized_doc());
        let runner = h.runner(&itemized_pass(), items, fetcher);

        let result = runner.run_batch(10).await.unwrap();
        assert_eq!(result.ingested_count, 1);

        let saved = JsonRecordSink::new(h.tmp.path())
            .load(ExtractionKind::FullItemized, "7")
            .await
            .unwrap()
            .unwrap();
        let ExtractedRecord::Itemized(filing) = saved else {
            panic!("expected itemized record");
        };
        assert_eq!(filing.lines.len(), 2);
        let task = h.store.get(&TaskKey::new("7", "IE")).await.unwrap().unwrap();
        assert_eq!(task.note.as_deref(), Some("2 itemized lines"));
    }

    #[tokio::test]
    async fn test_window_boundary() {
        let h = Harness::new().await;
        let now = Utc::now();
        let yesterday = now - Duration::days(1);
        let mut items = header_items(&["4", "3", "2", "1"]);
        items[0].published_at = Some(now);
        items[1].published_at = Some(now);
        items[2].published_at = Some(yesterday);
        items[3].published_at = Some(now);
        let fetcher = fetcher_for(&items, SUMMARY_DOC);

        let mut pass = header_pass();
        pass.window = ProcessingWindow::Today;
        let runner = h.runner(&pass, items, fetcher);

        let result = runner.run_batch(50).await.unwrap();
        assert_eq!(result.new_count, 2);
        assert!(result.reached_window_end);
        assert!(h.store.get(&TaskKey::new("2", "F3X")).await.unwrap().is_none());
        assert!(h.store.get(&TaskKey::new("1", "F3X")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_failure_then_reset_and_retry() {
        let h = Harness::new().await;
        let items = header_items(&["1"]);
        let runner = h.runner(&header_pass(), items.clone(), MemoryFetcher::default());

        let result = runner.run_batch(10).await.unwrap();
        assert_eq!(result.failed_count, 1);
        let task = h.store.get(&TaskKey::new("1", "F3X")).await.unwrap().unwrap();
        assert_eq!(task.failed_step, Some(FailedStep::Downloading));

        // Still failed on the next batch: failures are not retried implicitly
        let fixed = h.runner(&header_pass(), items.clone(), fetcher_for(&items, SUMMARY_DOC));
        assert!(fixed.run_batch(10).await.unwrap().caught_up());
        assert_eq!(h.status("1", "F3X").await, TaskStatus::Failed);

        assert_eq!(h.store.reset_failed().await.unwrap(), 1);
        let retried = fixed.run_batch(10).await.unwrap();
        assert_eq!(retried.ingested_count, 1);
        assert_eq!(h.status("1", "F3X").await, TaskStatus::Ingested);
    }

    #[tokio::test]
    async fn test_sink_failure_marks_parsing_failure() {
        let h = Harness::new().await;
        let items = header_items(&["1"]);
        let fetcher = fetcher_for(&items, SUMMARY_DOC);
        let runner = BatchRunner::new(
            &header_pass(),
            h.store.clone(),
            Arc::new(StaticFeed::new(items)),
            Extractor::new(Arc::new(fetcher), options("F3X")),
            Arc::new(BrokenSink),
        );

        let result = runner.run_batch(10).await.unwrap();
        assert_eq!(result.failed_count, 1);
        let task = h.store.get(&TaskKey::new("1", "F3X")).await.unwrap().unwrap();
        assert_eq!(task.failed_step, Some(FailedStep::Parsing));
        assert!(task.error_detail.is_some_and(|d| d.contains("disk full")));
    }

    #[tokio::test]
    async fn test_notifier_receives_ingested_records_once() {
        let h = Harness::new().await;
        let items = header_items(&["1", "2", "3"]);
        let fetcher = fetcher_for(&items, SUMMARY_DOC).with(&items[1].document_url, "garbage");
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = h
            .runner(&header_pass(), items, fetcher)
            .with_notifier(notifier.clone());

        let result = runner.run_batch(10).await.unwrap();
        assert_eq!(result.notified_count, 2);
        assert_eq!(
            notifier.calls.lock().unwrap()[0],
            ("F3X".to_string(), vec!["1".to_string(), "3".to_string()])
        );
        let task = h.store.get(&TaskKey::new("1", "F3X")).await.unwrap().unwrap();
        assert!(task.notified_at.is_some());

        // Nothing new, no call
        runner.run_batch(10).await.unwrap();
        assert_eq!(notifier.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_is_not_fatal() {
        let h = Harness::new().await;
        let items = header_items(&["1"]);
        let fetcher = fetcher_for(&items, SUMMARY_DOC);
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let runner = h
            .runner(&header_pass(), items, fetcher)
            .with_notifier(notifier);

        let result = runner.run_batch(10).await.unwrap();
        assert_eq!(result.ingested_count, 1);
        assert_eq!(result.notified_count, 0);
        let task = h.store.get(&TaskKey::new("1", "F3X")).await.unwrap().unwrap();
        assert!(task.notified_at.is_none());
    }

    #[tokio::test]
    async fn test_failed_notification_is_retried_by_a_later_batch() {
        let h = Harness::new().await;
        let items = header_items(&["1", "2"]);
        let failing = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let first = h
            .runner(&header_pass(), items.clone(), fetcher_for(&items, SUMMARY_DOC))
            .with_notifier(failing.clone());
        assert_eq!(first.run_batch(10).await.unwrap().ingested_count, 2);
        assert_eq!(failing.delivered().len(), 1);

        // The next batch claims nothing new but still owes the backlog
        let working = Arc::new(RecordingNotifier::default());
        let second = h
            .runner(&header_pass(), items.clone(), fetcher_for(&items, SUMMARY_DOC))
            .with_notifier(working.clone());
        let result = second.run_batch(10).await.unwrap();
        assert!(result.caught_up());
        assert_eq!(result.notified_count, 2);
        assert_eq!(working.delivered(), vec![vec!["1", "2"]]);

        second.run_batch(10).await.unwrap();
        assert_eq!(working.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_error_aborts_batch() {
        let h = Harness::new().await;
        let items = header_items(&["1", "2", "3", "4"]);
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = BatchRunner::new(
            &header_pass(),
            Arc::new(FlakyStore::new(h.store.clone(), 3)),
            Arc::new(StaticFeed::new(items.clone())),
            Extractor::new(Arc::new(fetcher_for(&items, SUMMARY_DOC)), options("F3X")),
            h.sink(),
        )
        .with_notifier(notifier.clone());

        let err = runner.run_batch(10).await.unwrap_err();
        assert!(err.is_store_error());
        assert_eq!(h.status("1", "F3X").await, TaskStatus::Ingested);
        assert_eq!(h.status("2", "F3X").await, TaskStatus::Ingested);
        for id in ["3", "4"] {
            assert!(h.store.get(&TaskKey::new(id, "F3X")).await.unwrap().is_none());
        }
        assert!(notifier.delivered().is_empty());

        // A healthy batch picks up the rest and the records the abort left unreported
        let healthy = h
            .runner(&header_pass(), items.clone(), fetcher_for(&items, SUMMARY_DOC))
            .with_notifier(notifier.clone());
        let result = healthy.run_batch(10).await.unwrap();
        assert_eq!(result.new_count, 2);
        assert_eq!(result.notified_count, 4);
        assert_eq!(notifier.delivered(), vec![vec!["1", "2", "3", "4"]]);
    }
}
