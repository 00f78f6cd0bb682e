//! Error types shared by grid and coordinate operations.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by grid construction and coordinate handling.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Field '{name}' has {actual} values, grid shape requires {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Variable not present in grid: {0}")]
    MissingVariable(String),

    #[error("Coordinate axis '{0}' is not strictly increasing")]
    UnsortedAxis(&'static str),

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("Grid has no time steps")]
    EmptyTimeAxis,

    #[error("Coordinate not found: {axis}={value}")]
    CoordinateNotFound { axis: &'static str, value: f64 },
}
