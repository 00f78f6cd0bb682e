//! Local-day UTCI highs and lows charts.
//!
//! A calendar date means a different UTC window at every longitude. Each
//! longitude's series is shifted by its hour angle (whole hours east of
//! Greenwich, wrapped into [-11, 12]) so that grouping the shifted series by
//! UTC date groups every column by its own local date.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use w4h_common::{coord_key, parse_date_key, Field, ForecastGrid, GridCoords, StageTimer};

use renderer::ChartRenderer;
use storage::{MediaStorage, StatusField, StatusStore, StoreResult};

use crate::error::EtlResult;
use crate::pipeline::vars;
use crate::retention::RetentionPlan;
use crate::source::SourceLabel;

/// Minimum number of complete hourly steps a date needs to be charted.
pub const MIN_DAILY_STEPS: usize = 24;

/// Hour-angle offset of a longitude in hours, in [-11, 12].
///
/// `round(lon / 15)` with halves to even; anything above 12 wraps by -24.
pub fn hour_angle_bucket(lon: f64) -> i64 {
    let bucket = (lon / 15.0).round_ties_even() as i64;
    if bucket > 12 {
        bucket - 24
    } else {
        bucket
    }
}

/// Repeat the longitude-0 column at 360 so charts wrap around the globe.
/// Grids without longitude 0 are returned unchanged.
pub fn add_cyclic_column(grid: ForecastGrid) -> EtlResult<ForecastGrid> {
    let Some(zero) = grid.coords().lon.iter().position(|&l| coord_key(l) == 0) else {
        return Ok(grid);
    };
    if grid.coords().lon.iter().any(|&l| coord_key(l) == coord_key(360.0)) {
        return Ok(grid);
    }

    let (coords, fields) = grid.into_parts();
    let mut lon = coords.lon.clone();
    lon.push(360.0);
    let wide = GridCoords::new(coords.lat.clone(), lon, coords.time.clone())?;

    let nt = coords.time.len();
    let mut out = BTreeMap::new();
    for (name, field) in fields {
        let mut values = Vec::with_capacity(wide.len());
        for i in 0..coords.lat.len() {
            let row = coords.index(i, 0, 0);
            values.extend_from_slice(&field.values()[row..row + coords.lon.len() * nt]);
            let start = coords.index(i, zero, 0);
            values.extend_from_slice(&field.values()[start..start + nt]);
        }
        out.insert(name, Field::new(values));
    }
    Ok(ForecastGrid::from_parts(wide, out)?)
}

/// Shift every longitude's series forward by its hour angle:
/// `shifted[k] = original[k - bucket]`, NaN where that falls off the axis.
pub fn shift_by_hour_angle(coords: &GridCoords, field: &Field) -> Field {
    let (nlat, _, nt) = coords.shape();
    let buckets: Vec<i64> = coords.lon.iter().map(|&l| hour_angle_bucket(l)).collect();
    let source = field.values();
    let mut shifted = vec![f32::NAN; source.len()];

    for i in 0..nlat {
        for (j, &bucket) in buckets.iter().enumerate() {
            let base = coords.index(i, j, 0);
            for k in 0..nt {
                let from = k as i64 - bucket;
                if (0..nt as i64).contains(&from) {
                    shifted[base + k] = source[base + from as usize];
                }
            }
        }
    }
    Field::new(shifted)
}

/// Per-cell extremes of one date, row-major over (lat, lon).
#[derive(Debug, Clone, PartialEq)]
pub struct DailyExtremes {
    pub date: NaiveDate,
    /// Complete steps that went into the extremes
    pub steps: usize,
    pub highs: Vec<f32>,
    pub lows: Vec<f32>,
}

/// Group steps by UTC date and compute extremes for every date with at
/// least [`MIN_DAILY_STEPS`] complete steps. A step is complete when no
/// cell is missing.
pub fn daily_extremes(coords: &GridCoords, field: &Field) -> Vec<DailyExtremes> {
    let (nlat, nlon, _) = coords.shape();
    let values = field.values();

    let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (k, time) in coords.time.iter().enumerate() {
        by_date.entry(time.date_naive()).or_default().push(k);
    }

    let mut out = Vec::new();
    for (date, steps) in by_date {
        let complete: Vec<usize> = steps
            .into_iter()
            .filter(|&k| {
                (0..nlat).all(|i| (0..nlon).all(|j| !values[coords.index(i, j, k)].is_nan()))
            })
            .collect();

        if complete.len() < MIN_DAILY_STEPS {
            debug!(date = %date, steps = complete.len(), "Not enough data to chart date");
            continue;
        }

        let mut highs = Vec::with_capacity(nlat * nlon);
        let mut lows = Vec::with_capacity(nlat * nlon);
        for i in 0..nlat {
            for j in 0..nlon {
                let series = complete.iter().map(|&k| values[coords.index(i, j, k)]);
                highs.push(series.clone().fold(f32::NEG_INFINITY, f32::max));
                lows.push(series.fold(f32::INFINITY, f32::min));
            }
        }

        out.push(DailyExtremes {
            date,
            steps: complete.len(),
            highs,
            lows,
        });
    }
    out
}

/// Media folder for a chart date.
pub fn chart_folder(date: NaiveDate) -> String {
    format!("{}Z", date)
}

/// `<date>Z_utci_<vertex>_from_gfs_data_up_to_<sourceDate>_<sourceTime>.png`
pub fn chart_file_name(date: NaiveDate, vertex: &str, label: &SourceLabel) -> String {
    format!(
        "{}Z_utci_{}_from_gfs_data_up_to_{}_{}.png",
        date, vertex, label.date, label.time
    )
}

/// Remove chart entries dated before `earliest`, and entries whose key is
/// not a date at all. Returns the removed keys.
pub async fn prune_chart_status(
    status: &StatusStore,
    earliest: DateTime<Utc>,
) -> EtlResult<Vec<String>> {
    let snapshot = status.fetch().await?;
    let mut removed = Vec::new();

    for key in snapshot.global_charts.keys() {
        let stale = match parse_date_key(key) {
            Ok(date) => date < earliest,
            Err(e) => {
                warn!(key = %key, error = %e, "Removing unparseable chart entry");
                true
            }
        };
        if stale {
            status
                .unset_field(StatusField::GlobalChart(key.clone()))
                .await?;
            removed.push(key.clone());
        }
    }

    if !removed.is_empty() {
        info!(removed = ?removed, "Removed stale chart entries");
    }
    Ok(removed)
}

/// Destination for rendered charts.
#[async_trait]
pub trait ChartPublisher: Send + Sync {
    /// Store one chart; `Ok(true)` only when the destination accepted it.
    async fn publish(&self, folder: &str, file_name: &str, png: Bytes) -> StoreResult<bool>;
}

#[async_trait]
impl ChartPublisher for MediaStorage {
    async fn publish(&self, folder: &str, file_name: &str, png: Bytes) -> StoreResult<bool> {
        self.put(folder, file_name, png).await
    }
}

/// Accepts and drops every chart, for dry runs.
pub struct DiscardPublisher;

#[async_trait]
impl ChartPublisher for DiscardPublisher {
    async fn publish(&self, folder: &str, file_name: &str, png: Bytes) -> StoreResult<bool> {
        info!(folder = folder, file = file_name, size = png.len(), "Discarded chart");
        Ok(true)
    }
}

/// What a charting pass did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChartReport {
    pub pruned: Vec<String>,
    pub published: Vec<String>,
    pub failed: Vec<String>,
    /// Dates with too few complete steps
    pub skipped_dates: Vec<NaiveDate>,
}

/// Shifts, aggregates, renders and publishes the daily charts.
pub struct ChartShifter {
    renderer: ChartRenderer,
    publisher: Arc<dyn ChartPublisher>,
    status: StatusStore,
}

impl ChartShifter {
    pub fn new(
        renderer: ChartRenderer,
        publisher: Arc<dyn ChartPublisher>,
        status: StatusStore,
    ) -> Self {
        Self {
            renderer,
            publisher,
            status,
        }
    }

    /// Chart every eligible date of the grid's `utci` variable.
    ///
    /// Upload failures are logged and skipped; only a successful upload
    /// records the chart in the status record.
    #[instrument(skip(self, grid, plan), fields(source = %label))]
    pub async fn run(
        &self,
        grid: ForecastGrid,
        plan: &RetentionPlan,
        label: &SourceLabel,
    ) -> EtlResult<ChartReport> {
        let timer = StageTimer::start("charting");
        let mut report = ChartReport::default();

        let mut grid = grid;
        let utci = grid.take(vars::UTCI)?;
        let (coords, _) = grid.into_parts();
        let grid = add_cyclic_column(ForecastGrid::new(coords).with_field(vars::UTCI, utci)?)?;
        report.pruned = prune_chart_status(&self.status, plan.earliest_chart_date).await?;

        let coords = grid.coords();
        let shifted = shift_by_hour_angle(coords, grid.field(vars::UTCI)?);
        let days = daily_extremes(coords, &shifted);
        drop(shifted);

        let charted: Vec<NaiveDate> = days.iter().map(|d| d.date).collect();
        let mut all_dates: Vec<NaiveDate> = coords.time.iter().map(|t| t.date_naive()).collect();
        all_dates.dedup();
        report.skipped_dates = all_dates
            .into_iter()
            .filter(|d| !charted.contains(d))
            .collect();

        let (nlat, nlon, _) = coords.shape();
        for day in days {
            for (vertex, values) in [("highs", &day.highs), ("lows", &day.lows)] {
                let png = self.renderer.render(values, nlat, nlon)?;
                let folder = chart_folder(day.date);
                let file_name = chart_file_name(day.date, vertex, label);

                match self.publisher.publish(&folder, &file_name, Bytes::from(png)).await {
                    Ok(true) => {
                        let field = StatusField::GlobalChart(day.date.to_string());
                        self.status.set_field(field, label.to_string()).await?;
                        info!(date = %day.date, vertex = vertex, "Charted");
                        report.published.push(file_name);
                    }
                    Ok(false) => {
                        warn!(file = %file_name, "Chart upload not accepted");
                        report.failed.push(file_name);
                    }
                    Err(e) => {
                        warn!(file = %file_name, error = %e, "Chart upload failed");
                        report.failed.push(file_name);
                    }
                }
            }
        }

        timer.finish();
        Ok(report)
    }
}
