use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid colour scale: {0}")]
    InvalidScale(String),

    #[error("Grid has {actual} values, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty grid")]
    EmptyGrid,

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}
