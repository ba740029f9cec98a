// src/services/fetch.rs

//! Size-bounded document downloads.
//!
//! Two limits exist:
//! - [`FetchLimit::Prefix`]: keep the first `n` bytes and hang up. The total
//!   document size is irrelevant.
//! - [`FetchLimit::Ceiling`]: keep everything, but refuse documents larger
//!   than `n` bytes. A declared `Content-Length` over the ceiling fails before
//!   any body is read; otherwise bytes are counted as they arrive.

use std::borrow::Cow;

use async_trait::async_trait;

use crate::error::ExtractError;

/// How much of a document may be held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLimit {
    Prefix(usize),
    Ceiling(u64),
}

/// Downloaded bytes. Owned by a single extraction and dropped after parsing.
#[derive(Debug)]
pub struct Document {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Document {
    pub fn new(bytes: Vec<u8>, truncated: bool) -> Self {
        Self { bytes, truncated }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether reading stopped at a prefix limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Content as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Accumulates chunks under a [`FetchLimit`].
#[derive(Debug)]
pub struct BoundedBuffer {
    bytes: Vec<u8>,
    limit: FetchLimit,
    truncated: bool,
}

impl BoundedBuffer {
    pub fn new(limit: FetchLimit) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append a chunk. Returns `Ok(true)` once the caller should stop reading.
    pub fn push(&mut self, chunk: &[u8]) -> Result<bool, ExtractError> {
        match self.limit {
            FetchLimit::Prefix(max) => {
                let room = max.saturating_sub(self.bytes.len());
                // An exact fill keeps reading: only a further byte proves truncation.
                if chunk.len() > room {
                    self.bytes.extend_from_slice(&chunk[..room]);
                    self.truncated = true;
                    return Ok(true);
                }
                self.bytes.extend_from_slice(chunk);
                Ok(false)
            }
            FetchLimit::Ceiling(max) => {
                let total = (self.bytes.len() + chunk.len()) as u64;
                if total > max {
                    return Err(ExtractError::TooLarge {
                        size_bytes: total,
                        limit_bytes: max,
                        declared: false,
                    });
                }
                self.bytes.extend_from_slice(chunk);
                Ok(false)
            }
        }
    }

    pub fn finish(self) -> Document {
        Document::new(self.bytes, self.truncated)
    }
}

/// Retrieves document bytes for a work item.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, limit: FetchLimit) -> Result<Document, ExtractError>;
}

/// Streaming HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, limit: FetchLimit) -> Result<Document, ExtractError> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        if let (FetchLimit::Ceiling(max), Some(declared)) = (limit, response.content_length()) {
            if declared > max {
                return Err(ExtractError::TooLarge {
                    size_bytes: declared,
                    limit_bytes: max,
                    declared: true,
                });
            }
        }

        let mut buffer = BoundedBuffer::new(limit);
        while let Some(chunk) = response.chunk().await? {
            if buffer.push(&chunk)? {
                log::debug!("Stopped reading {} at prefix limit", url);
                break;
            }
        }
        Ok(buffer.finish())
    }
}
