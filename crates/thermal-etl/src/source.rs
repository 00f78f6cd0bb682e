//! Forecast dataset interfaces.
//!
//! A source id names one GFS cycle (for example
//! `https://nomads.ncep.noaa.gov/dods/gfs_0p25_1hr/gfs20240115/gfs_0p25_1hr_06z`).
//! Resolvers find the newest id, openers turn an id into a lazily
//! materialized [`ForecastSource`].

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;
use w4h_common::{BoundingBox, Field, GridCoords};

use crate::error::{EtlError, EtlResult};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Transient source failure: {0}")]
    Transient(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Variable not in dataset: {0}")]
    MissingVariable(String),

    #[error("Nothing found: {0}")]
    NotFound(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl SourceError {
    /// Connection drops, timeouts and server-side (5xx) failures.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transient(_) => true,
            SourceError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Build the HTTP client every source reader uses.
    pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, SourceError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            SourceError::Transient(format!("{}: {}", url, e))
        } else if let Some(status) = e.status() {
            SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            SourceError::Parse(format!("{}: {}", url, e))
        }
    }
}

/// An opened forecast dataset restricted to the configured limits.
///
/// Coordinates are known up front; variable data is fetched on demand and
/// returned in (lat, lon, time) layout matching [`ForecastSource::coords`].
#[async_trait]
pub trait ForecastSource: Send + Sync {
    fn id(&self) -> &str;

    fn coords(&self) -> &GridCoords;

    async fn materialize(&self, variable: &str) -> Result<Field, SourceError>;
}

/// Opens a dataset by source id.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(
        &self,
        source_id: &str,
        bbox: &BoundingBox,
    ) -> Result<Box<dyn ForecastSource>, SourceError>;
}

/// Finds the newest available source id.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn latest(&self) -> Result<String, SourceError>;
}

/// Date and cycle of a source, as used in chart names and status labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLabel {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HHz`
    pub time: String,
    cycle: DateTime<Utc>,
}

fn source_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/gfs(\d{4})(\d{2})(\d{2}).*(\d{2})z$").expect("static regex is valid")
    })
}

impl SourceLabel {
    /// Parse a source id ending in `/gfsYYYYMMDD/..._HHz`.
    pub fn parse(source_id: &str) -> EtlResult<Self> {
        let invalid = || EtlError::SourceLabel(source_id.to_string());
        let caps = source_pattern().captures(source_id).ok_or_else(invalid)?;

        let year: i32 = caps[1].parse().map_err(|_| invalid())?;
        let month: u32 = caps[2].parse().map_err(|_| invalid())?;
        let day: u32 = caps[3].parse().map_err(|_| invalid())?;
        let hour: u32 = caps[4].parse().map_err(|_| invalid())?;

        let cycle = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(invalid)?;

        Ok(Self {
            date: format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]),
            time: format!("{}z", &caps[4]),
            cycle,
        })
    }

    /// Model initialization time.
    pub fn cycle_time(&self) -> DateTime<Utc> {
        self.cycle
    }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date, self.time)
    }
}
