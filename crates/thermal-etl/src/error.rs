//! Fatal errors of an ETL run.

use renderer::RenderError;
use storage::StoreError;
use thiserror::Error;
use w4h_common::CommonError;

pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Unable to load {variable} data: {reason}")]
    Load { variable: String, reason: String },

    #[error("Unable to open dataset {source_id}: {reason}")]
    DatasetOpen { source_id: String, reason: String },

    #[error("No source available: {0}")]
    NoSource(String),

    #[error("Source id '{0}' does not name a GFS cycle")]
    SourceLabel(String),

    #[error("Upload failed in every partitioning, last attempt used {parts} parts: {reason}")]
    UploadExhausted { parts: usize, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Near-land mask error: {0}")]
    Mask(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Grid error: {0}")]
    Grid(#[from] CommonError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}
