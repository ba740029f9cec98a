// src/storage/local.rs

//! Local filesystem record sink.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── summary/
//! │   └── {external_id}.json
//! └── itemized/
//!     └── {external_id}.json
//! ```
//!
//! Each record is written to a temp file and renamed into place, so readers
//! never observe a half-written record and re-saving is harmless.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ExtractedRecord, ExtractionKind};
use crate::storage::RecordSink;

/// JSON-file record sink.
#[derive(Clone)]
pub struct JsonRecordSink {
    root_dir: PathBuf,
}

impl JsonRecordSink {
    /// Create a new sink rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Relative key of a record.
    fn record_key(shape: &str, external_id: &str) -> Result<String> {
        let safe = !external_id.is_empty()
            && external_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(AppError::validation(format!(
                "external id '{external_id}' is not usable as a file name"
            )));
        }
        Ok(format!("{shape}/{external_id}.json"))
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

}

#[async_trait]
impl RecordSink for JsonRecordSink {
    async fn save(&self, record: &ExtractedRecord) -> Result<()> {
        let key = Self::record_key(record.shape(), record.external_id())?;
        self.write_json(&key, record).await?;
        log::debug!("Saved {} record to {}", record.shape(), key);
        Ok(())
    }

    async fn load(
        &self,
        kind: ExtractionKind,
        external_id: &str,
    ) -> Result<Option<ExtractedRecord>> {
        let key = Self::record_key(kind.shape(), external_id)?;
        self.read_json(&key).await
    }
}
