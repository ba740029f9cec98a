// src/services/extractor.rs

//! Memory-bounded extraction of filing documents.
//!
//! Header-only items read a fixed prefix and parse the summary record.
//! Full-itemized items download the whole document under a size ceiling and
//! parse every itemized line. In both cases the downloaded [`Document`] is
//! consumed by [`Extractor::parse`] and released before it returns.

use std::sync::Arc;

use crate::error::ExtractError;
use crate::models::{
    ExtractedRecord, ExtractionKind, FilingSummary, IngestConfig, ItemLine, ItemizedFiling,
    PassConfig, RunSettings, ScheduleELayout, WorkItem,
};
use crate::services::fetch::{Document, DocumentFetcher, FetchLimit};
use crate::services::filing::{self, FormRecord, ScheduleE};
use crate::utils::{sha256_hex, truncate_chars};

/// Limits and record layout for one pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub source_tag: String,
    pub header_bytes: usize,
    pub header_lines: usize,
    pub max_document_bytes: u64,
    pub text_budget: usize,
    pub receipts_threshold: f64,
    pub receipts_column: Option<usize>,
    pub form_prefix: String,
    pub line_prefix: String,
    pub schedule_e: ScheduleELayout,
}

impl ExtractOptions {
    pub fn for_pass(ingest: &IngestConfig, pass: &PassConfig, settings: &RunSettings) -> Self {
        Self {
            source_tag: pass.source_tag.clone(),
            header_bytes: ingest.header_bytes,
            header_lines: ingest.header_lines,
            max_document_bytes: settings.max_document_bytes,
            text_budget: ingest.text_budget,
            receipts_threshold: ingest.receipts_threshold,
            receipts_column: pass.receipts_column,
            form_prefix: pass.form_prefix.clone(),
            line_prefix: pass.line_prefix.clone(),
            schedule_e: pass.schedule_e.clone(),
        }
    }
}

/// Downloads and parses work items.
pub struct Extractor {
    fetcher: Arc<dyn DocumentFetcher>,
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, options: ExtractOptions) -> Self {
        Self { fetcher, options }
    }

    /// Size limit applied when downloading an item of `kind`.
    pub fn limit_for(&self, kind: ExtractionKind) -> FetchLimit {
        match kind {
            ExtractionKind::HeaderOnly => FetchLimit::Prefix(self.options.header_bytes),
            ExtractionKind::FullItemized => FetchLimit::Ceiling(self.options.max_document_bytes),
        }
    }

    pub async fn download(&self, item: &WorkItem) -> Result<Document, ExtractError> {
        let limit = self.limit_for(item.kind);
        let document = self.fetcher.fetch(&item.document_url, limit).await?;
        log::debug!(
            "Downloaded {} bytes for filing {}{}",
            document.len(),
            item.external_id,
            if document.is_truncated() { " (prefix)" } else { "" }
        );
        Ok(document)
    }

    /// Parse a downloaded document. The buffer is dropped before returning.
    pub fn parse(
        &self,
        item: &WorkItem,
        document: Document,
    ) -> Result<ExtractedRecord, ExtractError> {
        if document.is_empty() {
            return Err(ExtractError::parse("empty document"));
        }
        let record = match item.kind {
            ExtractionKind::HeaderOnly => self.parse_summary(item, &document),
            ExtractionKind::FullItemized => self.parse_itemized(item, &document),
        };
        drop(document);
        record
    }

    /// Download then parse.
    pub async fn extract(&self, item: &WorkItem) -> Result<ExtractedRecord, ExtractError> {
        let document = self.download(item).await?;
        self.parse(item, document)
    }

    fn parse_summary(
        &self,
        item: &WorkItem,
        document: &Document,
    ) -> Result<ExtractedRecord, ExtractError> {
        let text = document.text();
        let delimiter = filing::detect_delimiter(text.lines().next().unwrap_or_default());

        let mut summary = None;
        for fields in filing::records(&text, delimiter).take(self.options.header_lines) {
            let fields = fields?;
            if filing::has_record_type(&fields, &self.options.form_prefix) {
                summary = Some(fields);
                break;
            }
        }
        let fields = summary.ok_or_else(|| {
            ExtractError::parse(format!(
                "no {} summary record in first {} lines",
                self.options.form_prefix, self.options.header_lines
            ))
        })?;

        let form = FormRecord::from_fields(&fields)
            .ok_or_else(|| ExtractError::parse("summary record has no form type"))?;
        let total_receipts = filing::total_receipts(&fields, self.options.receipts_column);
        let budget = self.options.text_budget;

        Ok(ExtractedRecord::Summary(FilingSummary {
            external_id: item.external_id.clone(),
            source_tag: self.options.source_tag.clone(),
            form_type: form.form_type,
            committee_id: item
                .meta("CommitteeId")
                .map(str::to_string)
                .or(form.filer_id),
            committee_name: form.committee_name.map(|n| truncate_chars(&n, budget)),
            report_type: item.meta("ReportType").map(str::to_string),
            coverage_from: item.meta_date("CoverageFrom"),
            coverage_through: item.meta_date("CoverageThrough"),
            filed_at: item.published_at,
            document_url: item.document_url.clone(),
            total_receipts,
            threshold_flag: total_receipts.is_some_and(|t| t >= self.options.receipts_threshold),
            raw_meta: item.meta.clone(),
        }))
    }

    fn parse_itemized(
        &self,
        item: &WorkItem,
        document: &Document,
    ) -> Result<ExtractedRecord, ExtractError> {
        let text = document.text();
        let delimiter = filing::detect_delimiter(text.lines().next().unwrap_or_default());
        let mut records = filing::records(&text, delimiter);

        let header = records.next().transpose()?;
        if !header.is_some_and(|fields| filing::is_header_record(&fields)) {
            return Err(ExtractError::parse("document does not start with an HDR record"));
        }

        let budget = self.options.text_budget;
        let clip = |value: Option<String>| value.map(|v| truncate_chars(&v, budget));
        let mut form: Option<FormRecord> = None;
        let mut item_lines = Vec::new();

        for fields in records {
            let fields = fields?;
            if filing::has_record_type(&fields, &self.options.line_prefix) {
                let joined = fields.join("|");
                let se = ScheduleE::read(&fields, &self.options.schedule_e);
                item_lines.push(ItemLine {
                    event_id: sha256_hex(&format!("{}|{}", item.external_id, joined)),
                    record_type: fields[0].clone(),
                    expenditure_date: se.expenditure_date,
                    amount: se.amount,
                    support_oppose: se.support_oppose,
                    candidate_id: clip(se.candidate_id),
                    candidate_name: clip(se.candidate_name),
                    candidate_office: clip(se.candidate_office),
                    candidate_state: clip(se.candidate_state),
                    candidate_district: clip(se.candidate_district),
                    candidate_party: clip(se.candidate_party),
                    election_code: clip(se.election_code),
                    purpose: clip(se.purpose),
                    payee_name: clip(se.payee_name),
                    raw_line: truncate_chars(&joined, budget),
                });
            } else if form.is_none()
                && filing::has_record_type(&fields, &self.options.form_prefix)
            {
                form = FormRecord::from_fields(&fields);
            }
        }

        let committee_id = item
            .meta("CommitteeId")
            .map(str::to_string)
            .or_else(|| form.as_ref().and_then(|f| f.filer_id.clone()));
        let (form_type, committee_name) = match form {
            Some(f) => (Some(f.form_type), clip(f.committee_name)),
            None => (item.meta("FormType").map(str::to_string), None),
        };

        Ok(ExtractedRecord::Itemized(ItemizedFiling {
            external_id: item.external_id.clone(),
            source_tag: self.options.source_tag.clone(),
            form_type,
            committee_id,
            committee_name,
            report_type: item.meta("ReportType").map(str::to_string),
            coverage_from: item.meta_date("CoverageFrom"),
            coverage_through: item.meta_date("CoverageThrough"),
            filed_at: item.published_at,
            document_url: item.document_url.clone(),
            lines: item_lines,
            raw_meta: item.meta.clone(),
        }))
    }
}
