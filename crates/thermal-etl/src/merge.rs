//! Combine a freshly computed grid with the retained history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use w4h_common::{coord_key, Field, ForecastGrid, GridCoords};

use crate::error::EtlResult;

/// Union of two coordinate axes keyed at 1e-4 degree resolution.
///
/// Values from `primary` win when both axes carry the same key, so merging
/// an axis with itself returns it unchanged.
fn union_axis(primary: &[f64], secondary: &[f64]) -> Vec<f64> {
    let mut keyed: BTreeMap<i64, f64> = primary.iter().map(|&v| (coord_key(v), v)).collect();
    for &v in secondary {
        keyed.entry(coord_key(v)).or_insert(v);
    }
    keyed.into_values().collect()
}

/// Position of each source coordinate within the merged axis.
fn axis_positions(source: &[f64], merged: &[f64]) -> Vec<usize> {
    let lookup: BTreeMap<i64, usize> = merged
        .iter()
        .enumerate()
        .map(|(idx, &v)| (coord_key(v), idx))
        .collect();
    source.iter().map(|&v| lookup[&coord_key(v)]).collect()
}

fn time_positions(source: &[DateTime<Utc>], merged: &[DateTime<Utc>]) -> Vec<usize> {
    let lookup: BTreeMap<DateTime<Utc>, usize> =
        merged.iter().enumerate().map(|(idx, t)| (*t, idx)).collect();
    source.iter().map(|t| lookup[t]).collect()
}

/// Scatter `field` (laid out over `from`) into `target` (laid out over
/// `to`). With `skip_missing`, NaN inputs leave the target untouched.
fn scatter(
    field: &Field,
    from: &GridCoords,
    to: &GridCoords,
    positions: &(Vec<usize>, Vec<usize>, Vec<usize>),
    target: &mut [f32],
    skip_missing: bool,
) {
    let (lat_pos, lon_pos, time_pos) = positions;
    let values = field.values();
    for (i, &mi) in lat_pos.iter().enumerate() {
        for (j, &mj) in lon_pos.iter().enumerate() {
            for (k, &mk) in time_pos.iter().enumerate() {
                let v = values[from.index(i, j, k)];
                if skip_missing && v.is_nan() {
                    continue;
                }
                target[to.index(mi, mj, mk)] = v;
            }
        }
    }
}

/// Merge `new` over `prior`.
///
/// The prior grid is first restricted to timestamps at or after `cutoff` and
/// to the spatial extent of the new grid, so history from wider limits does
/// not outlive a change of limits. Every axis of the result is the sorted
/// union of both inputs. Non-missing
/// values of the new grid take precedence; cells only the prior grid covers
/// keep their prior values; everything else is NaN.
#[instrument(skip(new, prior), fields(cutoff = %cutoff))]
pub fn merge(
    new: ForecastGrid,
    prior: ForecastGrid,
    cutoff: DateTime<Utc>,
) -> EtlResult<ForecastGrid> {
    let prior = prior.select_time_from(cutoff);
    let prior = match new.extent() {
        Some(extent) => prior.select_extent(&extent),
        None => prior,
    };

    let (new_coords, new_fields) = new.into_parts();
    let (prior_coords, prior_fields) = prior.into_parts();

    let time: BTreeSet<DateTime<Utc>> = new_coords
        .time
        .iter()
        .chain(prior_coords.time.iter())
        .copied()
        .collect();
    let merged = GridCoords::new(
        union_axis(&new_coords.lat, &prior_coords.lat),
        union_axis(&new_coords.lon, &prior_coords.lon),
        time.into_iter().collect(),
    )?;

    let new_positions = (
        axis_positions(&new_coords.lat, &merged.lat),
        axis_positions(&new_coords.lon, &merged.lon),
        time_positions(&new_coords.time, &merged.time),
    );
    let prior_positions = (
        axis_positions(&prior_coords.lat, &merged.lat),
        axis_positions(&prior_coords.lon, &merged.lon),
        time_positions(&prior_coords.time, &merged.time),
    );

    let names: BTreeSet<&String> = new_fields.keys().chain(prior_fields.keys()).collect();
    let mut fields = BTreeMap::new();
    for name in names {
        let mut values = vec![f32::NAN; merged.len()];
        if let Some(field) = prior_fields.get(name) {
            scatter(field, &prior_coords, &merged, &prior_positions, &mut values, false);
        }
        if let Some(field) = new_fields.get(name) {
            scatter(field, &new_coords, &merged, &new_positions, &mut values, true);
        }
        fields.insert(name.clone(), Field::new(values));
    }

    let (nlat, nlon, ntime) = merged.shape();
    debug!(
        nlat = nlat,
        nlon = nlon,
        ntime = ntime,
        prior_steps = prior_coords.time.len(),
        "Merged forecast with history"
    );
    Ok(ForecastGrid::from_parts(merged, fields)?)
}
