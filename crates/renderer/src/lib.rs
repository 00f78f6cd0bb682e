//! Chart rendering for gridded thermal-comfort data.
//!
//! - Bilinear resampling of the source grid
//! - Banded colouring on a fixed threshold scale
//! - Indexed PNG encoding

pub mod chart;
pub mod error;
pub mod gradient;
pub mod png;
pub mod style;

pub use chart::ChartRenderer;
pub use error::RenderError;
pub use gradient::Color;
pub use style::ChartScale;
