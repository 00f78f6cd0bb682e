//! Forecast grids: named 3-D fields over (latitude, longitude, time).
//!
//! Fields are stored flat with time as the innermost axis, so the full time
//! series of one grid point is a contiguous slice. Missing values are NaN.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{CommonError, CommonResult};

/// Quantize a coordinate for equality and lookups (1e-4 degree resolution).
pub fn coord_key(value: f64) -> i64 {
    (value * 10_000.0).round() as i64
}

fn positions<T>(axis: &[T], keep: impl Fn(&T) -> bool) -> Vec<usize> {
    axis.iter()
        .enumerate()
        .filter(|(_, v)| keep(*v))
        .map(|(idx, _)| idx)
        .collect()
}

/// Coordinate axes of a forecast grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawCoords", try_from = "RawCoords")]
pub struct GridCoords {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub time: Vec<DateTime<Utc>>,
}

/// On-disk form of the coordinate axes (times as epoch seconds).
#[derive(Serialize, Deserialize)]
struct RawCoords {
    lat: Vec<f64>,
    lon: Vec<f64>,
    time: Vec<i64>,
}

impl From<GridCoords> for RawCoords {
    fn from(coords: GridCoords) -> Self {
        Self {
            lat: coords.lat,
            lon: coords.lon,
            time: coords.time.iter().map(|t| t.timestamp()).collect(),
        }
    }
}

impl TryFrom<RawCoords> for GridCoords {
    type Error = CommonError;

    fn try_from(raw: RawCoords) -> Result<Self, Self::Error> {
        let time = raw
            .time
            .into_iter()
            .map(|secs| DateTime::from_timestamp(secs, 0).ok_or(CommonError::InvalidTimestamp(secs)))
            .collect::<Result<Vec<_>, _>>()?;
        GridCoords::new(raw.lat, raw.lon, time)
    }
}

impl GridCoords {
    /// Create coordinates, validating that every axis is strictly increasing.
    pub fn new(lat: Vec<f64>, lon: Vec<f64>, time: Vec<DateTime<Utc>>) -> CommonResult<Self> {
        if !lat.windows(2).all(|w| w[0] < w[1]) {
            return Err(CommonError::UnsortedAxis("lat"));
        }
        if !lon.windows(2).all(|w| w[0] < w[1]) {
            return Err(CommonError::UnsortedAxis("lon"));
        }
        if !time.windows(2).all(|w| w[0] < w[1]) {
            return Err(CommonError::UnsortedAxis("time"));
        }
        Ok(Self { lat, lon, time })
    }

    /// Shape as (n_lat, n_lon, n_time).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.lat.len(), self.lon.len(), self.time.len())
    }

    /// Number of values a field over these coordinates holds.
    pub fn len(&self) -> usize {
        self.lat.len() * self.lon.len() * self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of (lat index, lon index, time index).
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.lon.len() + j) * self.time.len() + k
    }

    /// The forecast start: the first timestamp on the time axis.
    pub fn first_time(&self) -> CommonResult<DateTime<Utc>> {
        self.time.first().copied().ok_or(CommonError::EmptyTimeAxis)
    }
}

/// One variable's values in (lat, lon, time) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field(Vec<f32>);

impl Field {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// A field of `len` values all set to `value`.
    pub fn filled(len: usize, value: f32) -> Self {
        Self(vec![value; len])
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Element-wise map into a new field.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Field {
        Field(self.0.iter().map(|&v| f(v)).collect())
    }

    /// Element-wise combination of two equally sized fields.
    pub fn zip_map(&self, other: &Field, f: impl Fn(f32, f32) -> f32) -> Field {
        Field(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        )
    }

    /// Value equality where NaN matches NaN.
    pub fn same_values(&self, other: &Field) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()))
    }
}

/// A set of named fields sharing one coordinate system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastGrid {
    coords: GridCoords,
    fields: BTreeMap<String, Field>,
}

impl ForecastGrid {
    /// An empty grid over the given coordinates.
    pub fn new(coords: GridCoords) -> Self {
        Self {
            coords,
            fields: BTreeMap::new(),
        }
    }

    pub fn coords(&self) -> &GridCoords {
        &self.coords
    }

    /// Builder-style insert.
    pub fn with_field(mut self, name: &str, field: Field) -> CommonResult<Self> {
        self.insert(name, field)?;
        Ok(self)
    }

    /// Insert or replace a variable; its length must match the grid shape.
    pub fn insert(&mut self, name: &str, field: Field) -> CommonResult<()> {
        if field.len() != self.coords.len() {
            return Err(CommonError::ShapeMismatch {
                name: name.to_string(),
                expected: self.coords.len(),
                actual: field.len(),
            });
        }
        self.fields.insert(name.to_string(), field);
        Ok(())
    }

    /// Remove a variable and hand ownership to the caller.
    pub fn take(&mut self, name: &str) -> CommonResult<Field> {
        self.fields
            .remove(name)
            .ok_or_else(|| CommonError::MissingVariable(name.to_string()))
    }

    pub fn field(&self, name: &str) -> CommonResult<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| CommonError::MissingVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Drop variables that are no longer needed. Unknown names are ignored.
    pub fn drop_vars(&mut self, names: &[&str]) {
        for name in names {
            self.fields.remove(*name);
        }
    }

    /// Variable names in sorted order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Assemble a grid from parts, checking every field against the shape.
    pub fn from_parts(coords: GridCoords, fields: BTreeMap<String, Field>) -> CommonResult<Self> {
        let mut grid = Self::new(coords);
        for (name, field) in fields {
            grid.insert(&name, field)?;
        }
        Ok(grid)
    }

    pub fn into_parts(self) -> (GridCoords, BTreeMap<String, Field>) {
        (self.coords, self.fields)
    }

    /// Time series of one variable at grid point (i, j).
    pub fn series(&self, name: &str, i: usize, j: usize) -> CommonResult<&[f32]> {
        let field = self.field(name)?;
        let nt = self.coords.time.len();
        let start = self.coords.index(i, j, 0);
        Ok(&field.values()[start..start + nt])
    }

    /// Keep only timestamps at or after `cutoff`.
    pub fn select_time_from(self, cutoff: DateTime<Utc>) -> ForecastGrid {
        let lat: Vec<usize> = (0..self.coords.lat.len()).collect();
        let lon: Vec<usize> = (0..self.coords.lon.len()).collect();
        let time = positions(&self.coords.time, |t| *t >= cutoff);
        self.subset(lat, lon, time)
    }

    /// Keep only the grid points inside `bbox` (inclusive).
    pub fn select_extent(self, bbox: &BoundingBox) -> ForecastGrid {
        let lat = positions(&self.coords.lat, |&v| bbox.contains_lat(v));
        let lon = positions(&self.coords.lon, |&v| bbox.contains_lon(v));
        let time: Vec<usize> = (0..self.coords.time.len()).collect();
        self.subset(lat, lon, time)
    }

    /// The box spanned by the first and last grid points, if any.
    pub fn extent(&self) -> Option<BoundingBox> {
        let (lat, lon) = (&self.coords.lat, &self.coords.lon);
        Some(BoundingBox::new(
            *lon.first()?,
            *lat.first()?,
            *lon.last()?,
            *lat.last()?,
        ))
    }

    fn subset(self, lat: Vec<usize>, lon: Vec<usize>, time: Vec<usize>) -> ForecastGrid {
        if (lat.len(), lon.len(), time.len()) == self.coords.shape() {
            return self;
        }

        let coords = GridCoords {
            lat: lat.iter().map(|&i| self.coords.lat[i]).collect(),
            lon: lon.iter().map(|&j| self.coords.lon[j]).collect(),
            time: time.iter().map(|&k| self.coords.time[k]).collect(),
        };

        let mut fields = BTreeMap::new();
        for (name, field) in self.fields {
            let mut values = Vec::with_capacity(coords.len());
            for &i in &lat {
                for &j in &lon {
                    let start = self.coords.index(i, j, 0);
                    values.extend(time.iter().map(|&k| field.values()[start + k]));
                }
            }
            fields.insert(name, Field::new(values));
        }

        ForecastGrid { coords, fields }
    }

    /// Structural and value equality (NaN-aware).
    pub fn is_identical(&self, other: &ForecastGrid) -> bool {
        self.coords == other.coords
            && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(name, field)| {
                other
                    .fields
                    .get(name)
                    .is_some_and(|o| field.same_values(o))
            })
    }
}
