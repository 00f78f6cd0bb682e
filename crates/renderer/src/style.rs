//! Colour scales for chart rendering.

use crate::error::RenderError;
use crate::gradient::Color;

/// A banded colour scale: `colors[0]` covers everything below
/// `divisions[0]`, `colors[i]` covers `[divisions[i-1], divisions[i])`, and
/// the last colour covers everything from the last division upward.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartScale {
    pub colors: Vec<String>,
    pub divisions: Vec<f32>,
    rgb: Vec<Color>,
}

impl ChartScale {
    /// Build a scale from hex colours and ascending band edges.
    pub fn new(colors: Vec<String>, divisions: Vec<f32>) -> Result<Self, RenderError> {
        if colors.len() != divisions.len() + 1 {
            return Err(RenderError::InvalidScale(format!(
                "{} colours need {} divisions, got {}",
                colors.len(),
                colors.len().saturating_sub(1),
                divisions.len()
            )));
        }
        if !divisions.windows(2).all(|w| w[0] < w[1]) {
            return Err(RenderError::InvalidScale(
                "divisions must be strictly increasing".to_string(),
            ));
        }

        let rgb = colors
            .iter()
            .map(|hex| {
                hex_to_rgb(hex)
                    .map(|(r, g, b)| Color::new(r, g, b, 255))
                    .ok_or_else(|| RenderError::InvalidScale(format!("bad colour '{}'", hex)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            colors,
            divisions,
            rgb,
        })
    }

    /// UTCI thermal stress categories, cold (blue) to hot (red), in °C.
    pub fn utci_default() -> Self {
        let colors = [
            "#004adb", "#306cde", "#468de0", "#5aadde", "#75cdd6", "#b3e8b6", "#ffde98",
            "#fcad6e", "#f27946", "#e43a20",
        ];
        let divisions = vec![-40.0, -27.0, -13.0, 0.0, 9.0, 26.0, 32.0, 38.0, 46.0];
        let rgb = colors
            .iter()
            .filter_map(|hex| hex_to_rgb(hex))
            .map(|(r, g, b)| Color::new(r, g, b, 255))
            .collect();

        Self {
            colors: colors.iter().map(|c| c.to_string()).collect(),
            divisions,
            rgb,
        }
    }

    /// Band index of a value, or `None` for NaN.
    pub fn band(&self, value: f32) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        Some(self.divisions.partition_point(|&d| d <= value))
    }

    pub fn band_count(&self) -> usize {
        self.rgb.len()
    }

    /// Palette for indexed PNG output: every band colour, then transparent.
    pub fn palette(&self) -> Vec<(u8, u8, u8, u8)> {
        self.rgb
            .iter()
            .map(|c| (c.r, c.g, c.b, c.a))
            .chain(std::iter::once((0, 0, 0, 0)))
            .collect()
    }
}

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}
