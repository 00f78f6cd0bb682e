//! Geographic bounding box used to subset the forecast grid.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Longitudes follow the source grid convention (0° to 360° for GFS), so a
/// box never wraps across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Limits as they appear in configuration: `{"north":..,"south":..,"east":..,"west":..}`.
#[derive(Debug, Clone, Copy, Deserialize)]
struct Limits {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The full GFS globe (0°E..359.75°E, 90°S..90°N).
    pub fn globe() -> Self {
        Self::new(0.0, -90.0, 359.75, 90.0)
    }

    /// Parse a LIMITS JSON object: `{"north":50,"south":20,"east":300,"west":230}`.
    pub fn from_limits_json(s: &str) -> Result<Self, BboxParseError> {
        let limits: Limits =
            serde_json::from_str(s).map_err(|e| BboxParseError::InvalidFormat(e.to_string()))?;

        if limits.south > limits.north {
            return Err(BboxParseError::Inverted {
                low: "south",
                high: "north",
            });
        }
        if limits.west > limits.east {
            return Err(BboxParseError::Inverted {
                low: "west",
                high: "east",
            });
        }

        Ok(Self::new(limits.west, limits.south, limits.east, limits.north))
    }

    /// Check if a latitude lies within the box (inclusive).
    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.min_y && lat <= self.max_y
    }

    /// Check if a longitude lies within the box (inclusive).
    pub fn contains_lon(&self, lon: f64) -> bool {
        lon >= self.min_x && lon <= self.max_x
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid LIMITS format: {0}. Expected '{{\"north\":..,\"south\":..,\"east\":..,\"west\":..}}'")]
    InvalidFormat(String),

    #[error("Invalid LIMITS: {low} is greater than {high}")]
    Inverted {
        low: &'static str,
        high: &'static str,
    },
}
