//! Banded map charts from (lat, lon) grids.

use tracing::debug;

use crate::error::RenderError;
use crate::gradient::{band_indices, flip_rows, resample_grid};
use crate::png::create_png_indexed;
use crate::style::ChartScale;

/// Renders one 2-D field as a filled-band PNG in plate carrée.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    scale: ChartScale,
    /// Output pixels per grid step along each axis
    pixels_per_cell: usize,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new(ChartScale::utci_default(), 4)
    }
}

impl ChartRenderer {
    pub fn new(scale: ChartScale, pixels_per_cell: usize) -> Self {
        Self {
            scale,
            pixels_per_cell: pixels_per_cell.max(1),
        }
    }

    pub fn scale(&self) -> &ChartScale {
        &self.scale
    }

    /// Output size (width, height) for a grid of `nlat` x `nlon` points.
    pub fn output_size(&self, nlat: usize, nlon: usize) -> (usize, usize) {
        let size = |n: usize| {
            if n > 1 {
                (n - 1) * self.pixels_per_cell + 1
            } else {
                n
            }
        };
        (size(nlon), size(nlat))
    }

    /// Render values laid out row-major by ascending latitude then longitude.
    pub fn render(&self, values: &[f32], nlat: usize, nlon: usize) -> Result<Vec<u8>, RenderError> {
        if nlat == 0 || nlon == 0 {
            return Err(RenderError::EmptyGrid);
        }
        if values.len() != nlat * nlon {
            return Err(RenderError::DimensionMismatch {
                expected: nlat * nlon,
                actual: values.len(),
            });
        }

        let north_up = flip_rows(values, nlon);
        let (width, height) = self.output_size(nlat, nlon);
        let raster = resample_grid(&north_up, nlon, nlat, width, height);
        let indices = band_indices(&raster, &self.scale);

        let png = create_png_indexed(width, height, &self.scale.palette(), &indices)
            .map_err(RenderError::Encode)?;
        debug!(width = width, height = height, bytes = png.len(), "Rendered chart");
        Ok(png)
    }
}
