//! Derived-field computation over the raw forecast grid.
//!
//! Stages run strictly in order. Each takes the grid by value, pulls the
//! variables it needs out of it, and hands back a grid holding only what
//! later stages still use, so peak memory stays at a few fields.

use chrono::Datelike;
use tracing::{info, instrument};
use w4h_common::{retry_async, Field, ForecastGrid, RetryPolicy, StageTimer};

use crate::error::{EtlError, EtlResult};
use crate::physics::{RadiationBudget, ThermalIndices};
use crate::source::{ForecastSource, SourceError};

/// Source variable names.
pub mod vars {
    pub const TMP2M: &str = "tmp2m";
    pub const UGRD10M: &str = "ugrd10m";
    pub const VGRD10M: &str = "vgrd10m";
    pub const DPT2M: &str = "dpt2m";
    pub const DSWRFSFC: &str = "dswrfsfc";
    pub const DLWRFSFC: &str = "dlwrfsfc";
    pub const USWRFSFC: &str = "uswrfsfc";
    pub const ULWRFSFC: &str = "ulwrfsfc";

    pub const AVG_SOLAR_CZA: &str = "avg_solar_cza";
    pub const DIRECT_NORMAL: &str = "direct_normal_irradiance";
    pub const DIFFUSE_HORIZONTAL: &str = "diffuse_horizontal_irradiance";
    pub const MEAN_RADIANT_TEMP: &str = "mean_radiant_temp";
    pub const WIND_SPEED: &str = "wind_speed";

    pub const UTCI: &str = "utci";
    pub const WBGT: &str = "wbgt";
}

/// How scalar wind speed is derived from the 10 m components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindSpeedMode {
    /// `hypot(u, v)`
    #[default]
    Components,
    /// `hypot(u, u)`, reproducing historic published data
    LegacyUOnly,
}

/// Computes UTCI and WBGT from a forecast source.
pub struct FieldPipeline<'a> {
    physics: &'a dyn ThermalIndices,
    retry: RetryPolicy,
    wind_mode: WindSpeedMode,
}

impl<'a> FieldPipeline<'a> {
    pub fn new(physics: &'a dyn ThermalIndices) -> Self {
        Self {
            physics,
            retry: RetryPolicy::default(),
            wind_mode: WindSpeedMode::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wind_mode(mut self, wind_mode: WindSpeedMode) -> Self {
        self.wind_mode = wind_mode;
        self
    }

    /// Run every stage; the result holds only `utci` and `wbgt`.
    #[instrument(skip(self, source), fields(source = %source.id()))]
    pub async fn run(&self, source: &dyn ForecastSource) -> EtlResult<ForecastGrid> {
        let timer = StageTimer::start("calculate_forecasts");
        let grid = ForecastGrid::new(source.coords().clone());

        let grid = self.load_radiation(grid, source).await?;
        let grid = self.solar_geometry(grid)?;
        let grid = self.decompose_irradiance(grid)?;
        let grid = self.mean_radiant_temperature(grid)?;
        let grid = self.wind_speed(grid, source).await?;
        let grid = self.comfort_indices(grid, source).await?;

        let (nlat, nlon, ntime) = grid.coords().shape();
        info!(nlat = nlat, nlon = nlon, ntime = ntime, "Calculated forecasts");
        timer.finish();
        Ok(grid)
    }

    /// Fetch one variable, retrying transient failures.
    async fn materialize(&self, source: &dyn ForecastSource, variable: &str) -> EtlResult<Field> {
        let field = retry_async(self.retry, variable, SourceError::is_transient, || {
            source.materialize(variable)
        })
        .await
        .map_err(|e| EtlError::Load {
            variable: variable.to_string(),
            reason: e.to_string(),
        })?;

        let expected = source.coords().len();
        if field.len() != expected {
            return Err(EtlError::Load {
                variable: variable.to_string(),
                reason: format!("got {} values, grid needs {}", field.len(), expected),
            });
        }
        Ok(field)
    }

    /// Stage 1: the four radiative fluxes.
    pub async fn load_radiation(
        &self,
        mut grid: ForecastGrid,
        source: &dyn ForecastSource,
    ) -> EtlResult<ForecastGrid> {
        for var in [vars::USWRFSFC, vars::ULWRFSFC, vars::DLWRFSFC, vars::DSWRFSFC] {
            let field = self.materialize(source, var).await?;
            grid.insert(var, field)?;
        }
        Ok(grid)
    }

    /// Stage 2: hour-integrated cosine of the solar zenith angle, one
    /// timestep at a time.
    pub fn solar_geometry(&self, mut grid: ForecastGrid) -> EtlResult<ForecastGrid> {
        let coords = grid.coords().clone();
        let mut cza = Field::filled(coords.len(), f32::NAN);
        let values = cza.values_mut();

        for (k, time) in coords.time.iter().enumerate() {
            for (i, &lat) in coords.lat.iter().enumerate() {
                for (j, &lon) in coords.lon.iter().enumerate() {
                    values[coords.index(i, j, k)] =
                        self.physics
                            .cos_solar_zenith_integrated(lat, lon, *time, 0.0, 1.0)
                            as f32;
                }
            }
        }

        grid.insert(vars::AVG_SOLAR_CZA, cza)?;
        Ok(grid)
    }

    /// Stage 3: direct-normal and diffuse-horizontal irradiance.
    pub fn decompose_irradiance(&self, mut grid: ForecastGrid) -> EtlResult<ForecastGrid> {
        let coords = grid.coords().clone();
        let ghi = grid.field(vars::DSWRFSFC)?.values();
        let cza = grid.field(vars::AVG_SOLAR_CZA)?.values();

        let mut dni = vec![f32::NAN; coords.len()];
        let mut dhi = vec![f32::NAN; coords.len()];

        for (k, time) in coords.time.iter().enumerate() {
            let day_of_year = time.ordinal();
            for i in 0..coords.lat.len() {
                for j in 0..coords.lon.len() {
                    let idx = coords.index(i, j, k);
                    if ghi[idx].is_nan() || cza[idx].is_nan() {
                        continue;
                    }
                    let zenith_deg = (cza[idx] as f64).clamp(-1.0, 1.0).acos().to_degrees();
                    let split = self.physics.erbs(ghi[idx] as f64, zenith_deg, day_of_year);
                    dni[idx] = split.dni as f32;
                    dhi[idx] = split.dhi as f32;
                }
            }
        }

        grid.insert(vars::DIRECT_NORMAL, Field::new(dni))?;
        grid.insert(vars::DIFFUSE_HORIZONTAL, Field::new(dhi))?;
        Ok(grid)
    }

    /// Stage 4: mean radiant temperature; every radiative input is dropped.
    pub fn mean_radiant_temperature(&self, mut grid: ForecastGrid) -> EtlResult<ForecastGrid> {
        let ssrd = grid.take(vars::DSWRFSFC)?;
        let ssru = grid.take(vars::USWRFSFC)?;
        let strd = grid.take(vars::DLWRFSFC)?;
        let stru = grid.take(vars::ULWRFSFC)?;
        let cza = grid.take(vars::AVG_SOLAR_CZA)?;
        let dni = grid.take(vars::DIRECT_NORMAL)?;
        let dhi = grid.take(vars::DIFFUSE_HORIZONTAL)?;

        let mrt: Vec<f32> = (0..ssrd.len())
            .map(|idx| {
                let down_sw = ssrd.values()[idx] as f64;
                let down_lw = strd.values()[idx] as f64;
                let budget = RadiationBudget {
                    ssrd: down_sw,
                    ssr: down_sw - ssru.values()[idx] as f64,
                    dsrp: down_sw - dhi.values()[idx] as f64,
                    strd: down_lw,
                    fdir: dni.values()[idx] as f64,
                    strr: down_lw - stru.values()[idx] as f64,
                    cossza: cza.values()[idx] as f64,
                };
                self.physics.mean_radiant_temperature(&budget) as f32
            })
            .collect();

        grid.insert(vars::MEAN_RADIANT_TEMP, Field::new(mrt))?;
        Ok(grid)
    }

    /// Stage 5: scalar wind speed; the components are dropped.
    pub async fn wind_speed(
        &self,
        mut grid: ForecastGrid,
        source: &dyn ForecastSource,
    ) -> EtlResult<ForecastGrid> {
        let u = self.materialize(source, vars::UGRD10M).await?;
        let v = self.materialize(source, vars::VGRD10M).await?;

        let speed = match self.wind_mode {
            WindSpeedMode::Components => u.zip_map(&v, f32::hypot),
            WindSpeedMode::LegacyUOnly => u.map(|x| x.hypot(x)),
        };
        drop(u);
        drop(v);

        grid.insert(vars::WIND_SPEED, speed)?;
        Ok(grid)
    }

    /// Stage 6: UTCI and WBGT; only those two remain afterwards.
    pub async fn comfort_indices(
        &self,
        mut grid: ForecastGrid,
        source: &dyn ForecastSource,
    ) -> EtlResult<ForecastGrid> {
        let t2 = self.materialize(source, vars::TMP2M).await?;
        let td = self.materialize(source, vars::DPT2M).await?;
        let va = grid.take(vars::WIND_SPEED)?;
        let mrt = grid.take(vars::MEAN_RADIANT_TEMP)?;

        let n = t2.len();
        let mut utci = Vec::with_capacity(n);
        let mut wbgt = Vec::with_capacity(n);
        for idx in 0..n {
            let t = t2.values()[idx] as f64;
            let d = td.values()[idx] as f64;
            let w = va.values()[idx] as f64;
            let m = mrt.values()[idx] as f64;
            utci.push(self.physics.utci(t, w, m, d) as f32);
            wbgt.push(self.physics.wbgt(t, m, w, d) as f32);
        }

        grid.insert(vars::UTCI, Field::new(utci))?;
        grid.insert(vars::WBGT, Field::new(wbgt))?;
        Ok(grid)
    }
}
