// src/models/work_item.rs

//! Candidate unit of work produced by a feed.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which extraction strategy a work item needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    /// Read a bounded prefix and parse only the summary record
    HeaderOnly,
    /// Download the whole document (up to a ceiling) and parse every line
    FullItemized,
}

impl ExtractionKind {
    /// Storage namespace of the records this strategy produces.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::HeaderOnly => "summary",
            Self::FullItemized => "itemized",
        }
    }
}

/// A filing announced by the feed. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Stable identifier assigned by the publishing agency
    pub external_id: String,
    pub title: String,
    /// Absent when the feed entry carried no parseable date
    pub published_at: Option<DateTime<Utc>>,
    pub document_url: String,
    pub kind: ExtractionKind,
    /// `Key: Value` pairs from the entry description
    pub meta: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// A `MM/DD/YYYY` meta field as a date.
    pub fn meta_date(&self, key: &str) -> Option<NaiveDate> {
        self.meta(key).and_then(parse_mmddyyyy)
    }
}

/// Parse `MM/DD/YYYY`, as used throughout the agency's feeds and filings.
pub fn parse_mmddyyyy(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%m/%d/%Y").ok()
}
