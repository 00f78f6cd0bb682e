//! Raster preparation for gridded chart data: resampling, orientation, and
//! band colouring.

use crate::style::ChartScale;

/// Resample grid data to a different resolution using bilinear interpolation.
///
/// NaN propagates: an output pixel touching a missing source value is
/// missing too.
///
/// # Arguments
/// - `data`: Input grid data (row-major order)
/// - `src_width`: Source grid width
/// - `src_height`: Source grid height
/// - `dst_width`: Destination grid width
/// - `dst_height`: Destination grid height
///
/// # Returns
/// Resampled grid data at the requested resolution
pub fn resample_grid(
    data: &[f32],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<f32> {
    if src_width == dst_width && src_height == dst_height {
        // No resampling needed
        return data.to_vec();
    }

    let mut output = vec![f32::NAN; dst_width * dst_height];

    let ratio = |src: usize, dst: usize| {
        if dst > 1 && src > 1 {
            (src - 1) as f32 / (dst - 1) as f32
        } else {
            0.0
        }
    };
    let x_ratio = ratio(src_width, dst_width);
    let y_ratio = ratio(src_height, dst_height);

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            // Bilinear interpolation
            let x1 = (src_x.floor() as usize).min(src_width - 1);
            let y1 = (src_y.floor() as usize).min(src_height - 1);
            let x2 = (x1 + 1).min(src_width - 1);
            let y2 = (y1 + 1).min(src_height - 1);

            let dx = src_x - x1 as f32;
            let dy = src_y - y1 as f32;

            // Get the four surrounding values
            let v11 = data.get(y1 * src_width + x1).copied().unwrap_or(f32::NAN);
            let v21 = data.get(y1 * src_width + x2).copied().unwrap_or(f32::NAN);
            let v12 = data.get(y2 * src_width + x1).copied().unwrap_or(f32::NAN);
            let v22 = data.get(y2 * src_width + x2).copied().unwrap_or(f32::NAN);

            // Interpolate
            let v1 = lerp(v11, v21, dx);
            let v2 = lerp(v12, v22, dx);
            let value = lerp(v1, v2, dy);

            output[y * dst_width + x] = value;
        }
    }

    output
}

/// Linear blend that ignores a neighbour carrying zero weight, so a NaN
/// just past the edge of an exact sample point does not leak in.
#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    if t == 0.0 {
        a
    } else if t == 1.0 {
        b
    } else {
        a * (1.0 - t) + b * t
    }
}

/// Reverse row order so a south-to-north grid draws with north at the top.
pub fn flip_rows(data: &[f32], width: usize) -> Vec<f32> {
    if width == 0 {
        return Vec::new();
    }
    data.chunks(width).rev().flatten().copied().collect()
}

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Map each value to its palette index under `scale` (see
/// [`ChartScale::palette`]); missing values get the transparent entry.
pub fn band_indices(data: &[f32], scale: &ChartScale) -> Vec<u8> {
    let transparent = scale.band_count() as u8;
    data.iter()
        .map(|&v| scale.band(v).map(|b| b as u8).unwrap_or(transparent))
        .collect()
}
