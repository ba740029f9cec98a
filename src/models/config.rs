// src/models/config.rs

//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::ExtractionKind;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings shared by feed and document downloads
    #[serde(default)]
    pub http: HttpConfig,

    /// Task ledger location
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Extracted record output
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extraction limits and batch sizing
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Polling job behavior
    #[serde(default)]
    pub job: JobConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Feeds to poll, each processed as an independent pass
    #[serde(default = "defaults::passes")]
    pub passes: Vec<PassConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.database.url.trim().is_empty() {
            return Err(AppError::validation("database.url is empty"));
        }
        if self.ingest.max_new_per_run == 0 {
            return Err(AppError::validation("ingest.max_new_per_run must be > 0"));
        }
        if self.ingest.max_document_mb == 0 {
            return Err(AppError::validation("ingest.max_document_mb must be > 0"));
        }
        if self.ingest.header_bytes == 0 || self.ingest.header_lines == 0 {
            return Err(AppError::validation(
                "ingest.header_bytes and ingest.header_lines must be > 0",
            ));
        }
        if self.ingest.text_budget == 0 {
            return Err(AppError::validation("ingest.text_budget must be > 0"));
        }
        if self.job.max_runtime_mins == 0 {
            return Err(AppError::validation("job.max_runtime_mins must be > 0"));
        }
        if self.passes.is_empty() {
            return Err(AppError::validation("No passes defined"));
        }

        let mut tags = HashSet::new();
        for pass in &self.passes {
            if pass.source_tag.trim().is_empty() {
                return Err(AppError::validation("pass source_tag is empty"));
            }
            if !tags.insert(pass.source_tag.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate pass source_tag '{}'",
                    pass.source_tag
                )));
            }
            Url::parse(&pass.feed_url).map_err(|e| {
                AppError::validation(format!(
                    "pass '{}' has invalid feed_url: {}",
                    pass.source_tag, e
                ))
            })?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            job: JobConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
            passes: defaults::passes(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds; covers the whole download
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection string
    #[serde(default = "defaults::database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving one JSON file per extracted record
    #[serde(default = "defaults::records_dir")]
    pub records_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_dir: defaults::records_dir(),
        }
    }
}

/// Extraction limits and batch sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Per-batch cap on newly claimed items
    #[serde(default = "defaults::max_new_per_run")]
    pub max_new_per_run: usize,

    /// Size ceiling for full-itemized downloads, in megabytes
    #[serde(default = "defaults::max_document_mb")]
    pub max_document_mb: u64,

    /// Prefix read for header-only extraction
    #[serde(default = "defaults::header_bytes")]
    pub header_bytes: usize,

    /// Lines of the prefix inspected for the summary record
    #[serde(default = "defaults::header_lines")]
    pub header_lines: usize,

    /// Character budget for text copied into records
    #[serde(default = "defaults::text_budget")]
    pub text_budget: usize,

    /// Total receipts at or above this raise the threshold flag
    #[serde(default = "defaults::receipts_threshold")]
    pub receipts_threshold: f64,

    /// In-flight tasks untouched this long are reported as stale
    #[serde(default = "defaults::stale_after_mins")]
    pub stale_after_mins: i64,
}

impl IngestConfig {
    pub fn max_document_bytes(&self) -> u64 {
        megabytes(self.max_document_mb)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_new_per_run: defaults::max_new_per_run(),
            max_document_mb: defaults::max_document_mb(),
            header_bytes: defaults::header_bytes(),
            header_lines: defaults::header_lines(),
            text_budget: defaults::text_budget(),
            receipts_threshold: defaults::receipts_threshold(),
            stale_after_mins: defaults::stale_after_mins(),
        }
    }
}

/// Polling job behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Pause after a full batch before polling again
    #[serde(default = "defaults::pause_between_batches")]
    pub pause_between_batches_secs: u64,

    /// Hard stop for a single job run
    #[serde(default = "defaults::max_runtime")]
    pub max_runtime_mins: u64,

    /// Interval between job runs in watch mode
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_mins: u64,

    /// Minimum time between two job runs
    #[serde(default = "defaults::cooldown")]
    pub cooldown_mins: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            pause_between_batches_secs: defaults::pause_between_batches(),
            max_runtime_mins: defaults::max_runtime(),
            poll_interval_mins: defaults::poll_interval(),
            cooldown_mins: defaults::cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "defaults::notify_enabled")]
    pub enabled: bool,

    /// Line template, see [`crate::models::ExtractedRecord::format`]
    #[serde(default = "defaults::notify_template")]
    pub template: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::notify_enabled(),
            template: defaults::notify_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Cutoff applied to candidate publish times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingWindow {
    /// Items published since midnight UTC
    Today,
    /// No boundary
    All,
}

impl ProcessingWindow {
    /// Earliest publish time still inside the window.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc()),
            Self::All => None,
        }
    }
}

/// One feed and how to process its items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Ledger namespace for this feed's tasks
    pub source_tag: String,

    pub feed_url: String,

    pub strategy: ExtractionKind,

    #[serde(default = "defaults::window")]
    pub window: ProcessingWindow,

    /// Record type prefix of the summary record (header-only)
    #[serde(default = "defaults::form_prefix")]
    pub form_prefix: String,

    /// Record type prefix of itemized lines (full-itemized)
    #[serde(default = "defaults::line_prefix")]
    pub line_prefix: String,

    /// Fixed column of total receipts in the summary record. Unset falls
    /// back to the first decimal amount of the record.
    #[serde(default)]
    pub receipts_column: Option<usize>,

    /// Column positions of itemized Schedule E lines
    #[serde(default)]
    pub schedule_e: ScheduleELayout,
}

/// Zero-based field positions of a Schedule E line (format 8.x).
///
/// Lines shorter than [`ScheduleELayout::min_columns`] are read with the
/// positional-free heuristics instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleELayout {
    pub payee_organization: usize,
    pub payee_last_name: usize,
    pub payee_first_name: usize,
    pub election_code: usize,
    pub dissemination_date: usize,
    pub amount: usize,
    pub disbursement_date: usize,
    pub purpose: usize,
    pub support_oppose: usize,
    pub candidate_id: usize,
    pub candidate_last_name: usize,
    pub candidate_first_name: usize,
    pub candidate_middle_name: usize,
    pub candidate_office: usize,
    pub candidate_district: usize,
    pub candidate_state: usize,
    /// Not part of the 8.x line; set for formats that carry it
    pub candidate_party: Option<usize>,
}

impl Default for ScheduleELayout {
    fn default() -> Self {
        Self {
            payee_organization: 6,
            payee_last_name: 7,
            payee_first_name: 8,
            election_code: 17,
            dissemination_date: 19,
            amount: 20,
            disbursement_date: 21,
            purpose: 23,
            support_oppose: 26,
            candidate_id: 27,
            candidate_last_name: 28,
            candidate_first_name: 29,
            candidate_middle_name: 30,
            candidate_office: 33,
            candidate_district: 34,
            candidate_state: 35,
            candidate_party: None,
        }
    }
}

impl ScheduleELayout {
    /// Fields a line needs before positions are trusted.
    pub fn min_columns(&self) -> usize {
        [self.amount, self.support_oppose, self.candidate_id]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Runtime-tunable settings, stored as key/value rows next to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    MaxNewPerRun,
    NotifyEnabled,
    MaxDocumentMb,
}

impl SettingKey {
    pub const ALL: [SettingKey; 3] = [
        SettingKey::MaxNewPerRun,
        SettingKey::NotifyEnabled,
        SettingKey::MaxDocumentMb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxNewPerRun => "max_new_per_run",
            Self::NotifyEnabled => "notify_enabled",
            Self::MaxDocumentMb => "max_document_mb",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

/// Typed snapshot of runtime settings, taken once per batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub max_new_per_run: usize,
    pub notify_enabled: bool,
    pub max_document_bytes: u64,
}

impl RunSettings {
    /// Settings from the configuration file alone.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_new_per_run: config.ingest.max_new_per_run,
            notify_enabled: config.notify.enabled,
            max_document_bytes: config.ingest.max_document_bytes(),
        }
    }

    /// Layer stored overrides on top of the configuration file.
    ///
    /// Unknown keys and unparseable values are logged and ignored.
    pub fn resolve(config: &Config, overrides: &[(String, String)]) -> Self {
        let mut settings = Self::from_config(config);

        for (key, value) in overrides {
            let Some(setting) = SettingKey::from_key(key) else {
                log::warn!("Ignoring unknown setting '{}'", key);
                continue;
            };
            let value = value.trim();
            let applied = match setting {
                SettingKey::MaxNewPerRun => value
                    .parse::<usize>()
                    .ok()
                    .filter(|v| *v > 0)
                    .map(|v| settings.max_new_per_run = v),
                SettingKey::NotifyEnabled => {
                    parse_flag(value).map(|v| settings.notify_enabled = v)
                }
                SettingKey::MaxDocumentMb => value
                    .parse::<u64>()
                    .ok()
                    .filter(|v| *v > 0)
                    .map(|v| settings.max_document_bytes = megabytes(v)),
            };
            if applied.is_none() {
                log::warn!(
                    "Ignoring invalid value '{}' for setting '{}'",
                    value,
                    setting.as_str()
                );
            }
        }
        settings
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

mod defaults {
    use super::{PassConfig, ProcessingWindow, ScheduleELayout};
    use crate::models::ExtractionKind;

    // HTTP defaults
    pub fn user_agent() -> String {
        "ingestor/0.1 (filing monitor)".into()
    }
    pub fn timeout() -> u64 {
        60
    }

    pub fn database_url() -> String {
        "sqlite://ingestor.db".into()
    }

    pub fn records_dir() -> String {
        "records".into()
    }

    // Ingest defaults
    pub fn max_new_per_run() -> usize {
        50
    }
    pub fn max_document_mb() -> u64 {
        50
    }
    pub fn header_bytes() -> usize {
        50_000
    }
    pub fn header_lines() -> usize {
        100
    }
    pub fn text_budget() -> usize {
        200
    }
    pub fn receipts_threshold() -> f64 {
        50_000.0
    }
    pub fn stale_after_mins() -> i64 {
        30
    }

    // Job defaults
    pub fn pause_between_batches() -> u64 {
        2
    }
    pub fn max_runtime() -> u64 {
        55
    }
    pub fn poll_interval() -> u64 {
        5
    }
    pub fn cooldown() -> i64 {
        2
    }

    pub fn notify_enabled() -> bool {
        true
    }
    pub fn notify_template() -> String {
        "[{source}] {id} {committee}: {detail} <{url}>".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Pass defaults
    pub fn window() -> ProcessingWindow {
        ProcessingWindow::All
    }
    pub fn form_prefix() -> String {
        "F3X".into()
    }
    pub fn line_prefix() -> String {
        "SE".into()
    }
    pub fn passes() -> Vec<PassConfig> {
        vec![
            PassConfig {
                source_tag: "F3X".into(),
                feed_url: "https://efilingapps.fec.gov/rss/generate?preDefinedFilingType=F3X"
                    .into(),
                strategy: ExtractionKind::HeaderOnly,
                window: ProcessingWindow::Today,
                form_prefix: form_prefix(),
                line_prefix: line_prefix(),
                // Line 6(c), total receipts; 22 is 6(b), cash on hand
                receipts_column: Some(23),
                schedule_e: ScheduleELayout::default(),
            },
            PassConfig {
                source_tag: "IE".into(),
                feed_url: "https://efilingapps.fec.gov/rss/generate?forms=F5_24".into(),
                strategy: ExtractionKind::FullItemized,
                window: ProcessingWindow::All,
                // The feed carries both F24 and F5 filings
                form_prefix: "F".into(),
                line_prefix: line_prefix(),
                receipts_column: None,
                schedule_e: ScheduleELayout::default(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_cap() {
        let mut config = Config::default();
        config.ingest.max_new_per_run = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_source_tags() {
        let mut config = Config::default();
        let first = config.passes[0].clone();
        config.passes.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_feed_url() {
        let mut config = Config::default();
        config.passes[0].feed_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ingest]
            max_new_per_run = 10

            [[passes]]
            source_tag = "F3X"
            feed_url = "https://example.com/rss"
            strategy = "header_only"
            window = "today"
            "#,
        )
        .unwrap();

        assert_eq!(config.ingest.max_new_per_run, 10);
        assert_eq!(config.ingest.header_bytes, 50_000);
        assert_eq!(config.passes.len(), 1);
        assert_eq!(config.passes[0].form_prefix, "F3X");
        assert_eq!(config.passes[0].window, ProcessingWindow::Today);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_start() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 15, 30, 0).unwrap();
        assert_eq!(
            ProcessingWindow::Today.start(now),
            Some(Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap())
        );
        assert_eq!(ProcessingWindow::All.start(now), None);
    }

    #[test]
    fn test_run_settings_overrides() {
        let config = Config::default();
        let overrides = vec![
            ("max_new_per_run".to_string(), "5".to_string()),
            ("notify_enabled".to_string(), "no".to_string()),
            ("max_document_mb".to_string(), "2".to_string()),
        ];
        let settings = RunSettings::resolve(&config, &overrides);
        assert_eq!(settings.max_new_per_run, 5);
        assert!(!settings.notify_enabled);
        assert_eq!(settings.max_document_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_run_settings_ignore_invalid_values() {
        let config = Config::default();
        let overrides = vec![
            ("max_new_per_run".to_string(), "many".to_string()),
            ("max_new_per_run".to_string(), "0".to_string()),
            ("unknown".to_string(), "1".to_string()),
        ];
        let settings = RunSettings::resolve(&config, &overrides);
        assert_eq!(settings, RunSettings::from_config(&config));
    }
}
