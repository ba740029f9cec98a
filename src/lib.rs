// src/lib.rs

//! Filing ingestion library.
//!
//! Polls agency feeds, claims each filing once in a durable ledger, and
//! extracts it under strict memory limits.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
