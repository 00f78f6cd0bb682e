//! Resolution of the newest published GFS cycle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use reqwest::Client;
use tracing::{debug, info, instrument};

use thermal_etl::{SourceError, SourceResolver};
use w4h_common::floor_to_day;

/// Default DODS root of the hourly 0.25° GFS.
pub const DEFAULT_DODS_BASE: &str = "https://nomads.ncep.noaa.gov/dods/gfs_0p25_1hr";

/// GFS runs every six hours.
const CYCLE_HOURS: i64 = 6;

/// Probes candidate cycles newest first and picks the first one the server
/// has an `.info` page for.
pub struct LatestCycleResolver {
    client: Client,
    base_url: String,
    lookback: Duration,
}

impl LatestCycleResolver {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client: SourceError::http_client(std::time::Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            lookback: Duration::hours(48),
        })
    }

    /// Source ids of every cycle initialized in the lookback window before
    /// `now`, newest first.
    pub fn candidates(&self, now: DateTime<Utc>) -> Vec<String> {
        let day = floor_to_day(now);
        let mut cycle = day + Duration::hours(now.hour() as i64 / CYCLE_HOURS * CYCLE_HOURS);
        let oldest = now - self.lookback;

        let mut out = Vec::new();
        while cycle >= oldest {
            out.push(format!(
                "{}/gfs{}/gfs_0p25_1hr_{}z",
                self.base_url,
                cycle.format("%Y%m%d"),
                cycle.format("%H")
            ));
            cycle -= Duration::hours(CYCLE_HOURS);
        }
        out
    }

    /// Newest available source as of `now`.
    #[instrument(skip(self, now), fields(base = %self.base_url))]
    pub async fn latest_at(&self, now: DateTime<Utc>) -> Result<String, SourceError> {
        for candidate in self.candidates(now) {
            let url = format!("{}.info", candidate);
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(source = %candidate, "Found latest cycle");
                    return Ok(candidate);
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "Cycle not published");
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    return Err(SourceError::Transient(format!("{}: {}", url, e)));
                }
                Err(e) => debug!(url = %url, error = %e, "Cycle check failed"),
            }
        }

        Err(SourceError::NotFound(format!(
            "zero cycles found at {}",
            self.base_url
        )))
    }
}

#[async_trait]
impl SourceResolver for LatestCycleResolver {
    async fn latest(&self) -> Result<String, SourceError> {
        self.latest_at(Utc::now()).await
    }
}
