//! Publishing encoded forecasts to the document store.
//!
//! The batch is committed in parts; if any part fails, the whole batch is
//! retried split into more, smaller parts. Upserts are keyed by cell id, so
//! re-sending documents an abandoned attempt already wrote is harmless.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use w4h_common::{hour_offsets, retry_async, ForecastGrid, RetryPolicy, StageTimer};

use storage::{DocumentStore, ForecastDocument, StoreError};

use crate::encoding::encode_series;
use crate::error::{EtlError, EtlResult};
use crate::pipeline::vars;

/// Part counts tried in order until one commits completely.
pub const CHUNK_COUNTS: [usize; 7] = [12, 13, 15, 20, 30, 50, 100];

/// Document id of a grid cell: both coordinates with two decimals.
pub fn forecast_id(lat: f64, lon: f64) -> String {
    format!("{:.2},{:.2}", lat, lon)
}

/// One document per selected cell, in grid order.
///
/// Only selected cells are encoded. Missing steps are left out of a series
/// and a cell with no values at all gets no document.
pub fn build_batch(grid: &ForecastGrid, selected: &[bool]) -> EtlResult<Vec<ForecastDocument>> {
    let coords = grid.coords();
    let (nlat, nlon, _) = coords.shape();
    if selected.len() != nlat * nlon {
        return Err(EtlError::Mask(format!(
            "selection covers {} cells, grid has {}",
            selected.len(),
            nlat * nlon
        )));
    }

    let forecast_start = coords.first_time()?;
    let offsets = hour_offsets(&coords.time);
    let mut docs = Vec::new();
    let (mut empty, mut partial) = (0usize, 0usize);
    for (i, &lat) in coords.lat.iter().enumerate() {
        for (j, &lon) in coords.lon.iter().enumerate() {
            if !selected[i * nlon + j] {
                continue;
            }
            let codes = encode_series(
                grid.series(vars::UTCI, i, j)?,
                grid.series(vars::WBGT, i, j)?,
                &offsets,
            )
            .map_err(|e| EtlError::Encoding(format!("cell ({}, {}): {}", lat, lon, e)))?;

            if codes.is_empty() {
                empty += 1;
                continue;
            }
            if codes.len() < offsets.len() {
                partial += 1;
            }
            docs.push(ForecastDocument {
                id: forecast_id(lat, lon),
                forecast_start,
                temp_times_encoded: codes,
            });
        }
    }

    if empty > 0 || partial > 0 {
        warn!(empty = empty, partial = partial, "Near-land cells with missing values");
    }
    Ok(docs)
}

/// Split into `parts` contiguous slices whose sizes differ by at most one,
/// larger slices first. Empty slices are left out.
pub fn split_even<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut out = Vec::with_capacity(parts.min(items.len()));
    let mut start = 0;
    for p in 0..parts {
        let size = base + usize::from(p < extra);
        if size == 0 {
            break;
        }
        out.push(&items[start..start + size]);
        start += size;
    }
    out
}

/// Every partition in the schedule failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Part count of the last attempt
    pub parts: usize,
    pub error: E,
}

/// Run `attempt` with each part count in turn until one succeeds, returning
/// the count that worked. An empty schedule behaves like `[1]`.
pub async fn escalate<E, F, Fut>(counts: &[usize], mut attempt: F) -> Result<usize, Exhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let (&final_parts, earlier) = match counts.split_last() {
        Some(split) => split,
        None => (&1, &[][..]),
    };

    for &parts in earlier {
        match attempt(parts).await {
            Ok(()) => return Ok(parts),
            Err(e) => warn!(parts = parts, error = %e, "Partitioned commit failed, escalating"),
        }
    }

    attempt(final_parts)
        .await
        .map(|()| final_parts)
        .map_err(|error| Exhausted {
            parts: final_parts,
            error,
        })
}

/// Idempotent, chunked upload of forecast documents.
pub struct UploadOrchestrator {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    counts: Vec<usize>,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::store(),
            counts: CHUNK_COUNTS.to_vec(),
        }
    }

    /// Retry policy for a single part.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_counts(mut self, counts: Vec<usize>) -> Self {
        self.counts = counts;
        self
    }

    /// Commit all documents. Returns the part count that succeeded.
    #[instrument(skip(self, docs), fields(documents = docs.len()))]
    pub async fn upload(&self, docs: &[ForecastDocument]) -> EtlResult<usize> {
        let timer = StageTimer::start("upload_forecasts");

        let parts = escalate(&self.counts, |parts| self.commit_parts(docs, parts))
            .await
            .map_err(|exhausted| EtlError::UploadExhausted {
                parts: exhausted.parts,
                reason: exhausted.error.to_string(),
            })?;

        info!(documents = docs.len(), parts = parts, "Uploaded forecasts");
        timer.finish();
        Ok(parts)
    }

    async fn commit_parts(&self, docs: &[ForecastDocument], parts: usize) -> Result<(), StoreError> {
        for (idx, chunk) in split_even(docs, parts).into_iter().enumerate() {
            retry_async(self.policy, "upload.chunk", StoreError::is_transient, || {
                self.store.bulk_upsert_forecasts(chunk)
            })
            .await?;
            debug!(part = idx + 1, of = parts, size = chunk.len(), "Committed part");
        }
        Ok(())
    }
}
