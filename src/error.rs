// src/error.rs

//! Unified error handling for the ingestion pipeline.
//!
//! Two families of errors exist:
//! - [`AppError`]: ledger, configuration and transport failures. Ledger
//!   failures abort the job.
//! - [`ExtractError`]: failures scoped to a single work item. The batch
//!   runner records them on the task and moves on.

use std::fmt;

use thiserror::Error;

use crate::models::{FailedStep, TaskKey, TaskStatus};

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Ledger database failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Ledger holds a row we cannot interpret
    #[error("Store error: {0}")]
    Store(String),

    /// Transition requested on a task that was never claimed
    #[error("Task not found: {0}")]
    TaskNotFound(TaskKey),

    /// Transition that does not follow the task state machine
    #[error("Invalid transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: TaskKey,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Feed could not be read
    #[error("Feed error for {context}: {message}")]
    Feed { context: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error for unreadable ledger state.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a feed error with context.
    pub fn feed(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Feed {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// True when the error came from the task ledger.
    ///
    /// Ledger failures are fatal to a job; everything else only costs the
    /// current pass its iteration.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Store(_)
                | Self::TaskNotFound(_)
                | Self::InvalidTransition { .. }
        )
    }
}

/// Failure while extracting a single work item.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Network failure, timeout or non-success status
    #[error("download failed: {0}")]
    Download(String),

    /// Document exceeds the configured ceiling
    #[error("document too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    TooLarge {
        size_bytes: u64,
        limit_bytes: u64,
        /// True when the size came from `Content-Length` rather than counting
        declared: bool,
    },

    /// Document content was malformed
    #[error("parse failed: {0}")]
    Parse(String),
}

impl ExtractError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Phase to record on the task when this error marks it failed.
    ///
    /// `None` for [`ExtractError::TooLarge`], which is a skip.
    pub fn failed_step(&self) -> Option<FailedStep> {
        match self {
            Self::Download(_) => Some(FailedStep::Downloading),
            Self::Parse(_) => Some(FailedStep::Parsing),
            Self::TooLarge { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Download(format!("timed out: {err}"))
        } else {
            Self::Download(err.to_string())
        }
    }
}
