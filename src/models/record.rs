// src/models/record.rs

//! Structured output of a successful extraction.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ExtractionKind;

/// Summary of a periodic report, read from its header only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilingSummary {
    pub external_id: String,
    pub source_tag: String,
    /// Form type from the summary record (e.g. `F3XN`)
    pub form_type: String,
    pub committee_id: Option<String>,
    pub committee_name: Option<String>,
    pub report_type: Option<String>,
    pub coverage_from: Option<NaiveDate>,
    pub coverage_through: Option<NaiveDate>,
    pub filed_at: Option<DateTime<Utc>>,
    pub document_url: String,
    pub total_receipts: Option<f64>,
    /// Total receipts at or above the configured threshold
    pub threshold_flag: bool,
    /// Feed entry description fields, as announced
    #[serde(default)]
    pub raw_meta: BTreeMap<String, String>,
}

/// One itemized line of a filing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemLine {
    /// SHA-256 of filing id and raw line; stable across re-ingestion
    pub event_id: String,
    pub record_type: String,
    pub expenditure_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    /// `S` (support) or `O` (oppose)
    pub support_oppose: Option<String>,
    pub candidate_id: Option<String>,
    /// First, middle and last name joined with spaces
    pub candidate_name: Option<String>,
    pub candidate_office: Option<String>,
    pub candidate_state: Option<String>,
    pub candidate_district: Option<String>,
    pub candidate_party: Option<String>,
    pub election_code: Option<String>,
    pub purpose: Option<String>,
    /// Payee organization, or the individual's first and last name
    pub payee_name: Option<String>,
    pub raw_line: String,
}

/// A filing parsed in full.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemizedFiling {
    pub external_id: String,
    pub source_tag: String,
    pub form_type: Option<String>,
    pub committee_id: Option<String>,
    pub committee_name: Option<String>,
    pub report_type: Option<String>,
    pub coverage_from: Option<NaiveDate>,
    pub coverage_through: Option<NaiveDate>,
    pub filed_at: Option<DateTime<Utc>>,
    pub document_url: String,
    pub lines: Vec<ItemLine>,
    #[serde(default)]
    pub raw_meta: BTreeMap<String, String>,
}

/// Either shape of extracted record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ExtractedRecord {
    Summary(FilingSummary),
    Itemized(ItemizedFiling),
}

impl ExtractedRecord {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Summary(s) => &s.external_id,
            Self::Itemized(i) => &i.external_id,
        }
    }

    pub fn source_tag(&self) -> &str {
        match self {
            Self::Summary(s) => &s.source_tag,
            Self::Itemized(i) => &i.source_tag,
        }
    }

    /// Extraction strategy that produces this shape.
    pub fn kind(&self) -> ExtractionKind {
        match self {
            Self::Summary(_) => ExtractionKind::HeaderOnly,
            Self::Itemized(_) => ExtractionKind::FullItemized,
        }
    }

    /// Storage namespace for this shape.
    pub fn shape(&self) -> &'static str {
        self.kind().shape()
    }

    pub fn committee_name(&self) -> Option<&str> {
        match self {
            Self::Summary(s) => s.committee_name.as_deref(),
            Self::Itemized(i) => i.committee_name.as_deref(),
        }
    }

    pub fn document_url(&self) -> &str {
        match self {
            Self::Summary(s) => &s.document_url,
            Self::Itemized(i) => &i.document_url,
        }
    }

    /// Short description stored on the ingested task.
    pub fn describe(&self) -> String {
        match self {
            Self::Summary(s) => match s.total_receipts {
                Some(total) => format!("{} receipts {:.2}", s.form_type, total),
                None => s.form_type.clone(),
            },
            Self::Itemized(i) => format!("{} itemized lines", i.lines.len()),
        }
    }

    /// Format record for display using a template.
    ///
    /// Supported placeholders:
    /// - `{source}`, `{id}`, `{committee}`, `{url}`
    /// - `{detail}` (the same text as [`ExtractedRecord::describe`])
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{source}", self.source_tag())
            .replace("{id}", self.external_id())
            .replace("{committee}", self.committee_name().unwrap_or("-"))
            .replace("{url}", self.document_url())
            .replace("{detail}", &self.describe())
    }
}
