//! Common types and utilities shared across the weather-for-humans ETL crates.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod retry;
pub mod time;
pub mod timer;

pub use bbox::BoundingBox;
pub use error::{CommonError, CommonResult};
pub use grid::{coord_key, Field, ForecastGrid, GridCoords};
pub use retry::{retry_async, RetryPolicy};
pub use time::{floor_to_day, hour_offsets, parse_date_key, TimeParseError};
pub use timer::StageTimer;
