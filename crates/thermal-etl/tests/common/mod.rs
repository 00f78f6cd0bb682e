//! Shared helpers for thermal-etl integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::memory::InMemory;
use storage::{MemoryDocumentStore, ObjectStorage, StatusStore, StoreResult};
use w4h_common::{BoundingBox, Field, ForecastGrid, GridCoords};

use thermal_etl::physics::{Irradiance, RadiationBudget};
use thermal_etl::pipeline::vars;
use thermal_etl::{
    ChartPublisher, ForecastSource, SourceError, SourceOpener, SourceResolver, ThermalIndices,
};

pub const KELVIN: f32 = 273.15;

/// Physics with trivially predictable outputs:
/// `utci = t2 °C + wind speed`, `wbgt = dew point °C`, constant MRT.
pub struct StubIndices;

impl ThermalIndices for StubIndices {
    fn cos_solar_zenith_integrated(
        &self,
        _lat: f64,
        _lon: f64,
        _time: DateTime<Utc>,
        _tbegin: f64,
        _tend: f64,
    ) -> f64 {
        0.5
    }

    fn erbs(&self, ghi: f64, _zenith_deg: f64, _day_of_year: u32) -> Irradiance {
        Irradiance {
            dni: ghi,
            dhi: 0.0,
        }
    }

    fn mean_radiant_temperature(&self, _budget: &RadiationBudget) -> f64 {
        300.0
    }

    fn utci(&self, t2_k: f64, va_ms: f64, _mrt_k: f64, _td_k: f64) -> f64 {
        t2_k - KELVIN as f64 + va_ms
    }

    fn wbgt(&self, _t_k: f64, _mrt_k: f64, _va_ms: f64, td_k: f64) -> f64 {
        td_k - KELVIN as f64
    }
}

/// Raw source variables generated from per-cell closures.
///
/// `t2_c(i, j, k)` and `td_c(i, j, k)` are in °C; wind is `(u, v)` everywhere.
pub fn raw_grid(
    coords: &GridCoords,
    t2_c: impl Fn(usize, usize, usize) -> f32,
    td_c: impl Fn(usize, usize, usize) -> f32,
    wind: (f32, f32),
) -> ForecastGrid {
    let (nlat, nlon, nt) = coords.shape();
    let per_cell = |f: &dyn Fn(usize, usize, usize) -> f32| {
        let mut values = vec![0.0; coords.len()];
        for i in 0..nlat {
            for j in 0..nlon {
                for k in 0..nt {
                    values[coords.index(i, j, k)] = f(i, j, k);
                }
            }
        }
        Field::new(values)
    };

    let mut grid = ForecastGrid::new(coords.clone());
    grid.insert(vars::TMP2M, per_cell(&|i, j, k| t2_c(i, j, k) + KELVIN))
        .unwrap();
    grid.insert(vars::DPT2M, per_cell(&|i, j, k| td_c(i, j, k) + KELVIN))
        .unwrap();
    grid.insert(vars::UGRD10M, Field::filled(coords.len(), wind.0)).unwrap();
    grid.insert(vars::VGRD10M, Field::filled(coords.len(), wind.1)).unwrap();
    grid.insert(vars::DSWRFSFC, Field::filled(coords.len(), 400.0)).unwrap();
    grid.insert(vars::USWRFSFC, Field::filled(coords.len(), 80.0)).unwrap();
    grid.insert(vars::DLWRFSFC, Field::filled(coords.len(), 350.0)).unwrap();
    grid.insert(vars::ULWRFSFC, Field::filled(coords.len(), 400.0)).unwrap();
    grid
}

/// A dataset served from memory, optionally failing its first fetches.
pub struct StaticSource {
    id: String,
    grid: ForecastGrid,
    failures: Mutex<HashMap<String, u32>>,
    transient: bool,
}

impl StaticSource {
    pub fn new(id: &str, grid: ForecastGrid) -> Self {
        Self {
            id: id.to_string(),
            grid,
            failures: Mutex::new(HashMap::new()),
            transient: true,
        }
    }

    /// Fail the first `n` fetches of `variable`.
    pub fn failing(self, variable: &str, n: u32, transient: bool) -> Self {
        self.failures.lock().unwrap().insert(variable.to_string(), n);
        Self { transient, ..self }
    }
}

#[async_trait]
impl ForecastSource for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn coords(&self) -> &GridCoords {
        self.grid.coords()
    }

    async fn materialize(&self, variable: &str) -> Result<Field, SourceError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(variable) {
                if *left > 0 {
                    *left -= 1;
                    return Err(if self.transient {
                        SourceError::Transient(format!("{} reset", variable))
                    } else {
                        SourceError::Http {
                            status: 404,
                            url: variable.to_string(),
                        }
                    });
                }
            }
        }
        self.grid
            .field(variable)
            .cloned()
            .map_err(|_| SourceError::MissingVariable(variable.to_string()))
    }
}

/// Opens a [`StaticSource`] over a fixed grid, counting calls.
pub struct StaticOpener {
    grid: ForecastGrid,
    pub opens: Mutex<Vec<String>>,
}

impl StaticOpener {
    pub fn new(grid: ForecastGrid) -> Self {
        Self {
            grid,
            opens: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SourceOpener for StaticOpener {
    async fn open(
        &self,
        source_id: &str,
        _bbox: &BoundingBox,
    ) -> Result<Box<dyn ForecastSource>, SourceError> {
        self.opens.lock().unwrap().push(source_id.to_string());
        Ok(Box::new(StaticSource::new(source_id, self.grid.clone())))
    }
}

/// Always resolves to the same source id.
pub struct FixedResolver(pub String);

#[async_trait]
impl SourceResolver for FixedResolver {
    async fn latest(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}

/// Records chart uploads and answers with a fixed acceptance.
pub struct RecordingPublisher {
    accept: bool,
    pub uploads: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn files(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, file)| file.clone())
            .collect()
    }
}

#[async_trait]
impl ChartPublisher for RecordingPublisher {
    async fn publish(&self, folder: &str, file_name: &str, png: Bytes) -> StoreResult<bool> {
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        self.uploads
            .lock()
            .unwrap()
            .push((folder.to_string(), file_name.to_string()));
        Ok(self.accept)
    }
}

pub fn memory_storage() -> Arc<ObjectStorage> {
    Arc::new(ObjectStorage::from_store(Arc::new(InMemory::new()), "w4h-data"))
}

pub fn status_store(memory: &MemoryDocumentStore) -> StatusStore {
    StatusStore::new(Arc::new(memory.clone()))
}
