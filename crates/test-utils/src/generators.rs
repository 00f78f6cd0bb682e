//! Synthetic forecast grids with predictable, verifiable values.

use chrono::{DateTime, Duration, TimeZone, Utc};
use w4h_common::{Field, ForecastGrid, GridCoords};

/// Midnight UTC on 2024-01-15, the default start of synthetic series.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

/// `count` hourly timestamps starting at `start`.
pub fn hourly_times(start: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    (0..count)
        .map(|h| start + Duration::hours(h as i64))
        .collect()
}

/// Coordinates over the given axes with `hours` hourly steps from `start`.
///
/// # Panics
///
/// Panics when an axis is not strictly increasing.
pub fn hourly_coords(lat: &[f64], lon: &[f64], start: DateTime<Utc>, hours: usize) -> GridCoords {
    GridCoords::new(lat.to_vec(), lon.to_vec(), hourly_times(start, hours))
        .expect("synthetic axes must be strictly increasing")
}

/// A grid whose variables are computed per cell.
///
/// `value(name, i, j, k)` receives the variable name and the lat, lon and
/// time indices.
///
/// # Example
///
/// ```
/// use test_utils::{base_time, synthetic_grid};
///
/// let grid = synthetic_grid(&[0.0, 0.25], &[10.0], base_time(), 3, &["utci"], |_, i, _, k| {
///     (i * 10 + k) as f32
/// });
/// assert_eq!(grid.series("utci", 1, 0).unwrap(), &[10.0, 11.0, 12.0]);
/// ```
pub fn synthetic_grid(
    lat: &[f64],
    lon: &[f64],
    start: DateTime<Utc>,
    hours: usize,
    variables: &[&str],
    value: impl Fn(&str, usize, usize, usize) -> f32,
) -> ForecastGrid {
    let coords = hourly_coords(lat, lon, start, hours);
    let mut grid = ForecastGrid::new(coords.clone());
    for name in variables {
        let mut values = vec![0.0; coords.len()];
        for i in 0..lat.len() {
            for j in 0..lon.len() {
                for k in 0..hours {
                    values[coords.index(i, j, k)] = value(name, i, j, k);
                }
            }
        }
        grid.insert(name, Field::new(values))
            .expect("synthetic field matches its coordinates");
    }
    grid
}

/// A grid where every variable holds one constant value.
pub fn constant_grid(
    lat: &[f64],
    lon: &[f64],
    start: DateTime<Utc>,
    hours: usize,
    variables: &[(&str, f32)],
) -> ForecastGrid {
    let names: Vec<&str> = variables.iter().map(|(name, _)| *name).collect();
    synthetic_grid(lat, lon, start, hours, &names, |name, _, _, _| {
        variables
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .unwrap_or(f32::NAN)
    })
}

/// Evenly spaced axis from `start` with `count` points `step` apart.
pub fn axis(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|n| start + step * n as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hourly_times() {
        let times = hourly_times(base_time(), 3);
        assert_eq!(times[2] - times[0], Duration::hours(2));
    }

    #[test]
    fn test_constant_grid() {
        let grid = constant_grid(&[0.0], &[0.0, 0.25], base_time(), 2, &[("utci", 21.5)]);
        assert_eq!(grid.series("utci", 0, 1).unwrap(), &[21.5, 21.5]);
    }

    #[test]
    fn test_axis() {
        assert_eq!(axis(10.0, 0.25, 3), vec![10.0, 10.25, 10.5]);
    }
}
