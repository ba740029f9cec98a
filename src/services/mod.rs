// src/services/mod.rs

//! Service layer for the ingestion pipeline.
//!
//! This module contains the business logic for:
//! - Feed reading (`RssFeed`)
//! - Bounded downloads (`HttpFetcher`)
//! - Document extraction (`Extractor`)
//! - Batch notifications (`LogNotifier`)

pub mod extractor;
pub mod feed;
pub mod fetch;
pub mod filing;
pub mod notifier;

pub use extractor::{ExtractOptions, Extractor};
pub use feed::{Candidates, FeedSource, RssFeed};
pub use fetch::{Document, DocumentFetcher, FetchLimit, HttpFetcher};
pub use notifier::{LogNotifier, Notifier};
