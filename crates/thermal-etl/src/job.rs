//! One complete ETL run, from the gate check to the last chart.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use w4h_common::{retry_async, BoundingBox, RetryPolicy};

use storage::{DocumentStore, StatusField, StatusStore};

use crate::archive::GridArchive;
use crate::chart::{ChartReport, ChartShifter};
use crate::error::{EtlError, EtlResult};
use crate::gate::UpdateGate;
use crate::mask::NearLandMask;
use crate::merge::merge;
use crate::physics::ThermalIndices;
use crate::pipeline::{vars, FieldPipeline, WindSpeedMode};
use crate::retention::RetentionPlan;
use crate::source::{ForecastSource, SourceError, SourceLabel, SourceOpener, SourceResolver};
use crate::upload::{build_batch, UploadOrchestrator, CHUNK_COUNTS};

/// Tunables of a run.
#[derive(Debug, Clone)]
pub struct EtlSettings {
    pub bbox: BoundingBox,
    /// Use this source instead of resolving the newest one. An override is
    /// processed even when it is already the latest successful source.
    pub source_override: Option<String>,
    pub wind_mode: WindSpeedMode,
    /// Per-variable materialization retries
    pub load_retry: RetryPolicy,
    /// Dataset open retries
    pub open_retry: RetryPolicy,
    /// Per-part upload retries
    pub upload_retry: RetryPolicy,
    pub chunk_counts: Vec<usize>,
}

impl Default for EtlSettings {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::globe(),
            source_override: None,
            wind_mode: WindSpeedMode::default(),
            load_retry: RetryPolicy::default(),
            open_retry: RetryPolicy::unbounded(Duration::from_secs(5), Duration::from_secs(300)),
            upload_retry: RetryPolicy::store(),
            chunk_counts: CHUNK_COUNTS.to_vec(),
        }
    }
}

/// Collaborators of a run.
pub struct EtlDeps {
    pub status: StatusStore,
    pub documents: Arc<dyn DocumentStore>,
    pub archive: GridArchive,
    pub resolver: Arc<dyn SourceResolver>,
    pub opener: Arc<dyn SourceOpener>,
    pub physics: Arc<dyn ThermalIndices>,
    pub mask: NearLandMask,
    pub charts: ChartShifter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub source: String,
    pub documents: usize,
    /// Part count the upload succeeded with
    pub parts: usize,
    /// Time steps in the merged grid
    pub steps: usize,
    pub charts: ChartReport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another run holds the gate; nothing was done.
    AlreadyUpdating,
    /// The newest source was already processed.
    AlreadyLatest { source: String },
    Completed(RunSummary),
}

pub struct EtlJob {
    gate: UpdateGate,
    deps: EtlDeps,
    settings: EtlSettings,
}

impl EtlJob {
    pub fn new(deps: EtlDeps, settings: EtlSettings) -> Self {
        Self {
            gate: UpdateGate::new(deps.status.clone()),
            deps,
            settings,
        }
    }

    /// Run once. `now` drives retention and chart pruning.
    #[instrument(skip(self, now), fields(now = %now))]
    pub async fn run(&self, now: DateTime<Utc>) -> EtlResult<RunOutcome> {
        let Some(snapshot) = self.gate.precheck().await? else {
            return Ok(RunOutcome::AlreadyUpdating);
        };

        let source_id = match &self.settings.source_override {
            Some(source) => {
                info!(source = %source, "Updating using configured source");
                source.clone()
            }
            None => {
                info!("Checking for new data");
                let source = self.resolve_latest().await?;
                if source == snapshot.latest_successful_update_source {
                    info!(source = %source, "Already using latest data");
                    return Ok(RunOutcome::AlreadyLatest { source });
                }
                info!(
                    previous = %snapshot.latest_successful_update_source,
                    source = %source,
                    "Updating to newer data"
                );
                source
            }
        };
        let label = SourceLabel::parse(&source_id)?;

        let Some(lease) = self.gate.acquire().await? else {
            return Ok(RunOutcome::AlreadyUpdating);
        };

        let summary = lease.scope(self.update(&source_id, &label, now)).await?;
        Ok(RunOutcome::Completed(summary))
    }

    async fn resolve_latest(&self) -> EtlResult<String> {
        self.deps.resolver.latest().await.map_err(|e| match e {
            SourceError::NotFound(what) => EtlError::NoSource(what),
            other => EtlError::NoSource(other.to_string()),
        })
    }

    async fn open_source(&self, source_id: &str) -> EtlResult<Box<dyn ForecastSource>> {
        retry_async(self.settings.open_retry, "open_dataset", SourceError::is_transient, || {
            self.deps.opener.open(source_id, &self.settings.bbox)
        })
        .await
        .map_err(|e| EtlError::DatasetOpen {
            source_id: source_id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Everything that happens while holding the gate.
    async fn update(
        &self,
        source_id: &str,
        label: &SourceLabel,
        now: DateTime<Utc>,
    ) -> EtlResult<RunSummary> {
        let source = self.open_source(source_id).await?;
        let fresh = FieldPipeline::new(self.deps.physics.as_ref())
            .with_retry(self.settings.load_retry)
            .with_wind_mode(self.settings.wind_mode)
            .run(source.as_ref())
            .await?;
        drop(source);

        let plan = RetentionPlan::compute(now, fresh.coords().first_time()?);
        info!(
            cutoff = %plan.cutoff,
            earliest_chart_date = %plan.earliest_chart_date,
            "Planned retention"
        );

        let mut merged = match self.deps.archive.load().await? {
            Some(prior) => merge(fresh, prior, plan.cutoff)?,
            None => fresh,
        };

        let selected = self.deps.mask.select(merged.coords())?;
        let docs = build_batch(&merged, &selected)?;

        let parts = UploadOrchestrator::new(self.deps.documents.clone())
            .with_policy(self.settings.upload_retry)
            .with_counts(self.settings.chunk_counts.clone())
            .upload(&docs)
            .await?;
        let documents = docs.len();
        drop(docs);

        self.deps
            .status
            .set_field(StatusField::LatestSuccessfulUpdateSource, source_id)
            .await?;

        self.deps.archive.save(&merged).await?;
        let steps = merged.coords().time.len();
        merged.drop_vars(&[vars::WBGT]);

        let charts = self.deps.charts.run(merged, &plan, label).await?;

        info!(
            source = %source_id,
            documents = documents,
            parts = parts,
            charts = charts.published.len(),
            "ETL completed"
        );
        Ok(RunSummary {
            source: source_id.to_string(),
            documents,
            parts,
            steps,
            charts,
        })
    }
}
