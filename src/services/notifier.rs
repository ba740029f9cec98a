// src/services/notifier.rs

//! Post-batch notification of newly ingested records.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ExtractedRecord;

/// Receives the records a batch moved to `ingested`.
///
/// Called at most once per batch, only when there is something to report.
/// Errors are logged by the caller and never fail the batch.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, source_tag: &str, records: &[ExtractedRecord]) -> Result<()>;
}

/// Writes one formatted line per record to the log.
pub struct LogNotifier {
    template: String,
}

impl LogNotifier {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, records: &[ExtractedRecord]) -> Vec<String> {
        records.iter().map(|r| r.format(&self.template)).collect()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, source_tag: &str, records: &[ExtractedRecord]) -> Result<()> {
        log::info!("{} new {} filing(s)", records.len(), source_tag);
        for line in self.render(records) {
            log::info!("  {}", line);
        }
        Ok(())
    }
}
