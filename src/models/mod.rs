// src/models/mod.rs

//! Domain models for the ingestion pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod record;
mod task;
mod work_item;

// Re-export all public types
pub use config::{
    Config, DatabaseConfig, HttpConfig, IngestConfig, JobConfig, LoggingConfig, NotifyConfig,
    PassConfig, ProcessingWindow, RunSettings, ScheduleELayout, SettingKey, StorageConfig,
};
pub use record::{ExtractedRecord, FilingSummary, ItemLine, ItemizedFiling};
pub use task::{ClaimOutcome, FailedStep, IngestionTask, SkipReason, TaskKey, TaskStatus};
pub use work_item::{ExtractionKind, WorkItem, parse_mmddyyyy};
