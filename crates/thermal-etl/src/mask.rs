//! Static mask of grid cells close enough to land to be published.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;
use w4h_common::{coord_key, GridCoords};

use crate::error::{EtlError, EtlResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaskFile {
    lat: Vec<f64>,
    lon: Vec<f64>,
    /// Row-major over (lat, lon); non-zero means near land
    near_land: Vec<u8>,
}

/// Boolean (lat, lon) grid, looked up by coordinate value.
#[derive(Debug, Clone)]
pub struct NearLandMask {
    lat_index: HashMap<i64, usize>,
    lon_index: HashMap<i64, usize>,
    nlon: usize,
    cells: Vec<bool>,
}

impl NearLandMask {
    pub fn new(lat: &[f64], lon: &[f64], cells: Vec<bool>) -> EtlResult<Self> {
        if cells.len() != lat.len() * lon.len() {
            return Err(EtlError::Mask(format!(
                "{} cells for a {}x{} mask",
                cells.len(),
                lat.len(),
                lon.len()
            )));
        }
        Ok(Self {
            lat_index: lat.iter().enumerate().map(|(i, &v)| (coord_key(v), i)).collect(),
            lon_index: lon.iter().enumerate().map(|(j, &v)| (coord_key(v), j)).collect(),
            nlon: lon.len(),
            cells,
        })
    }

    pub fn from_json(json: &str) -> EtlResult<Self> {
        let file: MaskFile =
            serde_json::from_str(json).map_err(|e| EtlError::Mask(e.to_string()))?;
        let cells = file.near_land.iter().map(|&v| v != 0).collect();
        Self::new(&file.lat, &file.lon, cells)
    }

    pub async fn from_path(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EtlError::Mask(format!("{}: {}", path.display(), e)))?;
        let mask = Self::from_json(&json)?;
        info!(path = %path.display(), cells = mask.cells.len(), "Loaded near-land mask");
        Ok(mask)
    }

    /// Mask values for every (lat, lon) of `coords`, row-major. Every
    /// coordinate must exist in the mask.
    pub fn select(&self, coords: &GridCoords) -> EtlResult<Vec<bool>> {
        let lookup = |index: &HashMap<i64, usize>, axis: &str, value: f64| {
            index
                .get(&coord_key(value))
                .copied()
                .ok_or_else(|| EtlError::Mask(format!("{} {} not covered", axis, value)))
        };

        let rows = coords
            .lat
            .iter()
            .map(|&v| lookup(&self.lat_index, "lat", v))
            .collect::<EtlResult<Vec<_>>>()?;
        let cols = coords
            .lon
            .iter()
            .map(|&v| lookup(&self.lon_index, "lon", v))
            .collect::<EtlResult<Vec<_>>>()?;

        Ok(rows
            .iter()
            .flat_map(|&i| cols.iter().map(move |&j| self.cells[i * self.nlon + j]))
            .collect())
    }
}
