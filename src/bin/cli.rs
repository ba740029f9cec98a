//! Filing ingestor CLI
//!
//! Local execution entry point for the polling job and ledger administration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ingestor::{
    config::load_config,
    error::{AppError, Result},
    models::{Config, RunSettings, SettingKey},
    pipeline::{Cooldown, IngestJob, Pass, admin},
    services::{FeedSource, HttpFetcher, LogNotifier, RssFeed},
    storage::{ClaimStore, JsonRecordSink, SqliteClaimStore},
    utils::http,
};

/// Filing ingestor - polls agency feeds into a recoverable task ledger
#[derive(Parser, Debug)]
#[command(
    name = "ingestor",
    version,
    about = "Regulatory filing ingestion pipeline"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ingestor.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every pass until caught up
    Run,

    /// Run a single batch for one pass
    Batch {
        /// Source tag of the pass
        #[arg(long)]
        pass: String,

        /// Override the per-batch cap
        #[arg(long)]
        max: Option<usize>,
    },

    /// Run the job repeatedly on the configured interval
    Watch,

    /// Return every failed task to claimed
    ResetFailed,

    /// Show ledger entries for a filing
    Status {
        external_id: String,

        /// Limit to one source tag
        #[arg(long)]
        source: Option<String>,
    },

    /// List tasks stuck in flight
    Stale {
        /// Minutes without progress (default: ingest.stale_after_mins)
        #[arg(long)]
        older_than_mins: Option<i64>,
    },

    /// Mark stuck tasks failed so reset-failed can retry them
    FailStale {
        /// Minutes without progress (default: ingest.stale_after_mins)
        #[arg(long)]
        older_than_mins: Option<i64>,
    },

    /// Store a runtime setting override
    Set {
        /// One of: max_new_per_run, notify_enabled, max_document_mb
        key: String,
        value: String,
    },

    /// Show task counts per status
    Info,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load configuration before logging exists, so fall back to stderr.
fn load(path: &Path) -> Result<Config> {
    load_config(path).inspect_err(|e| eprintln!("Failed to load {}: {}", path.display(), e))
}

/// Wire the job from configuration.
fn build_job(config: Arc<Config>, store: Arc<SqliteClaimStore>) -> Result<IngestJob> {
    let client = http::create_async_client(&config.http)?;
    let passes = config
        .passes
        .iter()
        .map(|pass| Pass {
            config: pass.clone(),
            feed: Arc::new(RssFeed::for_pass(client.clone(), pass)) as Arc<dyn FeedSource>,
        })
        .collect();

    Ok(IngestJob::new(
        Arc::clone(&config),
        store,
        Arc::new(HttpFetcher::new(client)),
        Arc::new(JsonRecordSink::new(&config.storage.records_dir)),
        Arc::new(LogNotifier::new(&config.notify.template)),
        passes,
    ))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Ingestor starting with {} pass(es)", config.passes.len());

    let config = Arc::new(config);
    let stale_after =
        |mins: Option<i64>| chrono::Duration::minutes(mins.unwrap_or(config.ingest.stale_after_mins));

    match cli.command {
        Command::Run => {
            let job = build_job(Arc::clone(&config), open_store(&config).await?)?;
            job.run().await?;
        }

        Command::Batch { pass, max } => {
            let job = build_job(Arc::clone(&config), open_store(&config).await?)?;
            let result = job.run_batch(&pass, max).await?;
            if let Some(error) = result.last_error {
                log::warn!("Last error: {}", error);
            }
        }

        Command::Watch => {
            let job = build_job(Arc::clone(&config), open_store(&config).await?)?;
            let mut cooldown = Cooldown::from_minutes(config.job.cooldown_mins);
            let mut ticker = tokio::time::interval(Duration::from_secs(
                config.job.poll_interval_mins.max(1) * 60,
            ));

            loop {
                ticker.tick().await;
                let now = chrono::Utc::now();
                if !cooldown.try_begin(now) {
                    log::debug!("Cooling down, skipping this tick");
                    continue;
                }
                match job.run().await {
                    Ok(_) => {}
                    Err(e) if e.is_store_error() => return Err(e),
                    Err(e) => log::error!("Job failed: {}", e),
                }
            }
        }

        Command::ResetFailed => {
            let store = open_store(&config).await?;
            admin::reset_failed(store.as_ref()).await?;
        }

        Command::Status {
            external_id,
            source,
        } => {
            let store = open_store(&config).await?;
            let tasks = admin::task_status(store.as_ref(), &external_id, source.as_deref()).await?;
            if tasks.is_empty() {
                log::info!("No ledger entry for {}", external_id);
            }
            for task in &tasks {
                log::info!("{}", admin::describe_task(task));
            }
        }

        Command::Stale { older_than_mins } => {
            let store = open_store(&config).await?;
            let tasks = admin::stale_tasks(store.as_ref(), stale_after(older_than_mins)).await?;
            log::info!("{} stale task(s)", tasks.len());
        }

        Command::FailStale { older_than_mins } => {
            let store = open_store(&config).await?;
            admin::fail_stale(store.as_ref(), stale_after(older_than_mins)).await?;
        }

        Command::Set { key, value } => {
            let setting = SettingKey::from_key(&key)
                .ok_or_else(|| AppError::validation(format!("unknown setting '{key}'")))?;
            let store = open_store(&config).await?;
            store.put_setting(setting, &value).await?;
            let settings = job_settings(&config, &store).await?;
            log::info!("Set {} = {} (effective: {:?})", key, value, settings);
        }

        Command::Info => {
            let store = open_store(&config).await?;
            log::info!("Ledger: {}", config.database.url);
            log::info!("Records: {}", config.storage.records_dir);
            for (status, count) in admin::status_counts(store.as_ref()).await? {
                log::info!("  {:<12} {}", status, count);
            }
            log::info!("Settings: {:?}", job_settings(&config, &store).await?);
        }

        Command::Validate => {
            log::info!("✓ Config OK ({})", cli.config.display());
            for line in pass_summary(&config) {
                log::info!("  {}", line);
            }
        }
    }

    Ok(())
}

/// One line per configured pass.
fn pass_summary(config: &Config) -> Vec<String> {
    config
        .passes
        .iter()
        .map(|pass| {
            format!(
                "{} -> {} ({:?}, window {:?})",
                pass.source_tag, pass.feed_url, pass.strategy, pass.window
            )
        })
        .collect()
}

/// Validation never touches the ledger, so each command opens it on demand.
async fn open_store(config: &Config) -> Result<Arc<SqliteClaimStore>> {
    Ok(Arc::new(SqliteClaimStore::connect(&config.database.url).await?))
}

/// Settings the next batch would run with.
async fn job_settings(config: &Config, store: &SqliteClaimStore) -> Result<RunSettings> {
    let overrides = store.setting_overrides().await?;
    Ok(RunSettings::resolve(config, &overrides))
}
