//! Thermal-comfort forecast ETL.
//!
//! Turns a GFS forecast cycle into UTCI/WBGT forecasts for every near-land
//! grid cell and into daily highs and lows charts:
//!
//! 1. [`gate`] makes sure only one run updates at a time
//! 2. [`pipeline`] derives the comfort indices from the raw fields
//! 3. [`retention`] and [`merge`] combine them with the retained history
//! 4. [`encoding`] packs each cell's series into integers
//! 5. [`upload`] publishes the series to the document store
//! 6. [`chart`] renders and publishes the charts
//!
//! [`job::EtlJob`] wires the stages into one run.

pub mod archive;
pub mod chart;
pub mod encoding;
pub mod error;
pub mod gate;
pub mod job;
pub mod mask;
pub mod merge;
pub mod opendap;
pub mod physics;
pub mod pipeline;
pub mod retention;
pub mod source;
pub mod upload;

pub use archive::GridArchive;
pub use chart::{ChartPublisher, ChartReport, ChartShifter, DiscardPublisher};
pub use encoding::{decode, encode, encode_checked, encode_series};
pub use error::{EtlError, EtlResult};
pub use gate::{UpdateGate, UpdateLease};
pub use job::{EtlDeps, EtlJob, EtlSettings, RunOutcome, RunSummary};
pub use mask::NearLandMask;
pub use merge::merge;
pub use opendap::{OpendapOpener, OpendapSource};
pub use physics::{StandardIndices, ThermalIndices};
pub use pipeline::{FieldPipeline, WindSpeedMode};
pub use retention::RetentionPlan;
pub use source::{ForecastSource, SourceError, SourceLabel, SourceOpener, SourceResolver};
pub use upload::{build_batch, escalate, UploadOrchestrator, CHUNK_COUNTS};
