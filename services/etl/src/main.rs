//! Thermal-comfort forecast ETL job.
//!
//! Resolves the newest GFS cycle, derives UTCI and WBGT, merges them with the
//! retained history, publishes near-land forecast documents and redraws the
//! daily highs/lows charts. Meant to run as a scheduled batch task.

mod config;
mod sources;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use object_store::memory::InMemory;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use renderer::ChartRenderer;
use storage::{
    DocumentStore, MediaStorage, MemoryDocumentStore, ObjectStorage, PgDocumentStore, StatusStore,
};
use thermal_etl::{
    ChartPublisher, ChartShifter, DiscardPublisher, EtlDeps, EtlJob, EtlSettings, GridArchive,
    NearLandMask, OpendapOpener, RunOutcome, StandardIndices,
};

use config::EtlConfig;
use sources::LatestCycleResolver;

#[derive(Parser, Debug)]
#[command(name = "etl")]
#[command(about = "GFS thermal-comfort forecast ETL")]
struct Args {
    /// Process this DODS source instead of the newest cycle (overrides
    /// DATA_SOURCE_URL)
    #[arg(long)]
    source: Option<String>,

    /// Keep documents and the archive in memory and discard charts
    #[arg(long)]
    dry_run: bool,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();

    let config = match EtlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            report_failure("0", "0", &e);
            return ExitCode::FAILURE;
        }
    };

    match run(args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&config.task_index, &config.task_attempt, &e);
            ExitCode::FAILURE
        }
    }
}

/// Final failure line in the batch runner's structured log format.
fn report_failure(task_index: &str, task_attempt: &str, e: &anyhow::Error) {
    error!(error = %e, "ETL failed");
    let line = serde_json::json!({
        "message": format!(
            "Task #{}, Attempt #{} failed: {:#}",
            task_index, task_attempt, e
        ),
        "severity": "ERROR",
    });
    println!("{}", line);
}

async fn run(args: Args, config: &EtlConfig) -> Result<()> {
    info!(dry_run = args.dry_run, "Starting thermal-comfort ETL");

    let (documents, storage, publisher): (
        Arc<dyn DocumentStore>,
        Arc<ObjectStorage>,
        Arc<dyn ChartPublisher>,
    ) = if args.dry_run {
        (
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(ObjectStorage::from_store(
                Arc::new(InMemory::new()),
                &config.storage.bucket,
            )),
            Arc::new(DiscardPublisher),
        )
    } else {
        let store = PgDocumentStore::connect(&config.database_url).await?;
        store.migrate().await?;
        (
            Arc::new(store),
            Arc::new(ObjectStorage::new(&config.storage)?),
            Arc::new(MediaStorage::new(config.media.clone())?),
        )
    };

    let mask = NearLandMask::from_path(&config.near_land_mask_path).await?;
    let status = StatusStore::new(documents.clone());

    let deps = EtlDeps {
        status: status.clone(),
        documents,
        archive: GridArchive::new(storage),
        resolver: Arc::new(LatestCycleResolver::new(&config.dods_base_url)?),
        opener: Arc::new(OpendapOpener::new(OpendapOpener::DEFAULT_TIMEOUT)?),
        physics: Arc::new(StandardIndices),
        mask,
        charts: ChartShifter::new(ChartRenderer::default(), publisher, status),
    };

    let settings = EtlSettings {
        bbox: config.bbox,
        source_override: args.source.or_else(|| config.source_override.clone()),
        wind_mode: config.wind_mode,
        ..EtlSettings::default()
    };

    match EtlJob::new(deps, settings).run(Utc::now()).await? {
        RunOutcome::AlreadyUpdating => info!("Update already in progress, exiting"),
        RunOutcome::AlreadyLatest { source } => {
            info!(source = %source, "Already using latest data")
        }
        RunOutcome::Completed(summary) => info!(
            source = %summary.source,
            documents = summary.documents,
            steps = summary.steps,
            charts = summary.charts.published.len(),
            failed_charts = summary.charts.failed.len(),
            "ETL finished"
        ),
    }
    Ok(())
}
