//! GFS datasets served over OPeNDAP (DODS) ASCII responses.
//!
//! Opening a dataset reads its `.dds` for dimension sizes and fetches the
//! `lat`/`lon` axes; variables are fetched lazily, one hyperslab request
//! each, restricted to the bounding box and forecast hours 1..=120.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, instrument};
use w4h_common::{BoundingBox, Field, GridCoords};

use crate::source::{ForecastSource, SourceError, SourceLabel, SourceOpener};

/// Values at or above this are the server's missing-data marker.
const FILL_THRESHOLD: f32 = 9.99e20;
/// First and last forecast hour read. Hour 0 has no radiative fluxes.
const FIRST_HOUR: usize = 1;
const LAST_HOUR: usize = 120;

fn dimension_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Float64\s+(time|lat|lon)\[\w+\s*=\s*(\d+)\];").expect("static regex is valid")
    })
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\w+)\[time\s*=\s*\d+\]\[lat\s*=\s*\d+\]\[lon\s*=\s*\d+\]")
            .expect("static regex is valid")
    })
}

/// Index window along each axis, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    time: (usize, usize),
    lat: (usize, usize),
    lon: (usize, usize),
}

impl Window {
    fn constraint(&self) -> String {
        format!(
            "[{}:{}][{}:{}][{}:{}]",
            self.time.0, self.time.1, self.lat.0, self.lat.1, self.lon.0, self.lon.1
        )
    }
}

/// First and last index of `axis` satisfying `inside`.
fn index_window(axis: &[f64], inside: impl Fn(f64) -> bool) -> Option<(usize, usize)> {
    let first = axis.iter().position(|&v| inside(v))?;
    let last = axis.iter().rposition(|&v| inside(v))?;
    Some((first, last))
}

/// Dimension sizes and gridded variable names from a `.dds` response.
fn parse_dds(dds: &str) -> Result<(usize, usize, usize, HashSet<String>), SourceError> {
    let (mut time, mut lat, mut lon) = (None, None, None);
    for caps in dimension_pattern().captures_iter(dds) {
        let size: usize = caps[2]
            .parse()
            .map_err(|_| SourceError::Parse(format!("bad dimension size {}", &caps[2])))?;
        match &caps[1] {
            "time" => time = Some(size),
            "lat" => lat = Some(size),
            _ => lon = Some(size),
        }
    }

    let variables = variable_pattern()
        .captures_iter(dds)
        .map(|caps| caps[1].to_string())
        .collect();

    match (time, lat, lon) {
        (Some(t), Some(y), Some(x)) => Ok((t, y, x, variables)),
        _ => Err(SourceError::Parse("dds lacks time/lat/lon dimensions".to_string())),
    }
}

fn parse_number(token: &str) -> Result<f64, SourceError> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| SourceError::Parse(format!("not a number: '{}'", token.trim())))
}

/// Values of a one-dimensional ASCII response such as `lat, [721]` followed
/// by one comma-separated line.
fn parse_ascii_vector(body: &str, name: &str) -> Result<Vec<f64>, SourceError> {
    let mut lines = body.lines().map(str::trim);
    let header = format!("{},", name);
    lines
        .by_ref()
        .find(|line| line.starts_with(&header))
        .ok_or_else(|| SourceError::Parse(format!("no '{}' array in response", name)))?;
    let data = lines
        .next()
        .ok_or_else(|| SourceError::Parse(format!("'{}' array has no data", name)))?;
    data.split(',').map(parse_number).collect()
}

/// Values of a gridded ASCII response, in the order the server lists them
/// (time, lat, lon). Only rows of the requested array are read; the
/// coordinate maps after it are skipped.
fn parse_ascii_grid(body: &str, expected: usize) -> Result<Vec<f32>, SourceError> {
    let mut values = Vec::with_capacity(expected);
    for line in body.lines().map(str::trim) {
        if !line.starts_with('[') {
            continue;
        }
        let data = line
            .rfind(']')
            .map(|end| line[end + 1..].trim_start_matches(','))
            .ok_or_else(|| SourceError::Parse(format!("malformed row '{}'", line)))?;
        for token in data.split(',') {
            let v = parse_number(token)? as f32;
            values.push(if v >= FILL_THRESHOLD { f32::NAN } else { v });
        }
    }

    if values.len() != expected {
        return Err(SourceError::Parse(format!(
            "expected {} values, got {}",
            expected,
            values.len()
        )));
    }
    Ok(values)
}

/// Reorder time-major values into the (lat, lon, time) grid layout.
fn to_grid_layout(time_major: &[f32], coords: &GridCoords) -> Vec<f32> {
    let (nlat, nlon, nt) = coords.shape();
    let mut out = vec![f32::NAN; time_major.len()];
    for k in 0..nt {
        for i in 0..nlat {
            for j in 0..nlon {
                out[coords.index(i, j, k)] = time_major[(k * nlat + i) * nlon + j];
            }
        }
    }
    out
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, SourceError> {
    debug!(url = %url, "Fetching");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| SourceError::from_reqwest(url, e))
}

/// Opens GFS cycles by their DODS URL.
pub struct OpendapOpener {
    client: Client,
}

impl OpendapOpener {
    /// Per-request timeout for full-size datasets.
    pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(600);

    pub fn new(timeout: StdDuration) -> Result<Self, SourceError> {
        Ok(Self {
            client: SourceError::http_client(timeout)?,
        })
    }
}

#[async_trait]
impl SourceOpener for OpendapOpener {
    #[instrument(skip(self, bbox))]
    async fn open(
        &self,
        source_id: &str,
        bbox: &BoundingBox,
    ) -> Result<Box<dyn ForecastSource>, SourceError> {
        let label =
            SourceLabel::parse(source_id).map_err(|e| SourceError::Parse(e.to_string()))?;

        let dds = fetch_text(&self.client, &format!("{}.dds", source_id)).await?;
        let (ntime, nlat, nlon, variables) = parse_dds(&dds)?;

        let lat_url = format!("{}.ascii?lat[0:{}]", source_id, nlat.saturating_sub(1));
        let lat_axis = parse_ascii_vector(&fetch_text(&self.client, &lat_url).await?, "lat")?;
        let lon_url = format!("{}.ascii?lon[0:{}]", source_id, nlon.saturating_sub(1));
        let lon_axis = parse_ascii_vector(&fetch_text(&self.client, &lon_url).await?, "lon")?;

        let lat = index_window(&lat_axis, |v| bbox.contains_lat(v))
            .ok_or_else(|| SourceError::NotFound("no latitude inside the limits".to_string()))?;
        let lon = index_window(&lon_axis, |v| bbox.contains_lon(v))
            .ok_or_else(|| SourceError::NotFound("no longitude inside the limits".to_string()))?;
        if ntime <= FIRST_HOUR {
            return Err(SourceError::NotFound(format!("only {} time steps", ntime)));
        }
        let window = Window {
            time: (FIRST_HOUR, LAST_HOUR.min(ntime - 1)),
            lat,
            lon,
        };

        let cycle = label.cycle_time();
        let coords = GridCoords::new(
            lat_axis[lat.0..=lat.1].to_vec(),
            lon_axis[lon.0..=lon.1].to_vec(),
            (window.time.0..=window.time.1)
                .map(|h| cycle + Duration::hours(h as i64))
                .collect(),
        )
        .map_err(|e| SourceError::Parse(e.to_string()))?;

        let (ny, nx, nt) = coords.shape();
        info!(nlat = ny, nlon = nx, ntime = nt, "Opened dataset");

        Ok(Box::new(OpendapSource {
            client: self.client.clone(),
            id: source_id.to_string(),
            coords,
            window,
            variables,
        }))
    }
}

/// One opened GFS cycle.
pub struct OpendapSource {
    client: Client,
    id: String,
    coords: GridCoords,
    window: Window,
    variables: HashSet<String>,
}

#[async_trait]
impl ForecastSource for OpendapSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn coords(&self) -> &GridCoords {
        &self.coords
    }

    #[instrument(skip(self), fields(source = %self.id))]
    async fn materialize(&self, variable: &str) -> Result<Field, SourceError> {
        if !self.variables.contains(variable) {
            return Err(SourceError::MissingVariable(variable.to_string()));
        }

        let url = format!("{}.ascii?{}{}", self.id, variable, self.window.constraint());
        let body = fetch_text(&self.client, &url).await?;
        let time_major = parse_ascii_grid(&body, self.coords.len())?;
        debug!(values = time_major.len(), "Materialized variable");
        Ok(Field::new(to_grid_layout(&time_major, &self.coords)))
    }
}
