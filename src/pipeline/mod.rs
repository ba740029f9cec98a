// src/pipeline/mod.rs

//! Pipeline entry points for ingestion operations.
//!
//! - `BatchRunner`: one batch over one feed
//! - `IngestJob`: repeated batches over every configured feed
//! - `admin`: manual recovery of failed and stuck tasks

pub mod admin;
pub mod cooldown;
pub mod job;
pub mod runner;

pub use cooldown::Cooldown;
pub use job::{IngestJob, JobSummary, Pass, StopReason};
pub use runner::{BatchResult, BatchRunner};
