//! Document model and the document store interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;

/// Fixed id of the singleton status record.
pub const STATUS_ID: &str = "status";

/// The singleton record that coordinates runs and tracks published charts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    #[serde(default)]
    pub is_updating: bool,
    #[serde(default)]
    pub latest_successful_update_source: String,
    /// Chart date (`YYYY-MM-DD`) to the source label it was drawn from.
    #[serde(default)]
    pub global_charts: BTreeMap<String, String>,
}

impl StatusDocument {
    /// The body a freshly created store starts with.
    pub fn initial_json() -> Value {
        serde_json::json!({
            "isUpdating": false,
            "latestSuccessfulUpdateSource": "",
            "globalCharts": {}
        })
    }
}

/// An individually addressable field of the status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusField {
    IsUpdating,
    LatestSuccessfulUpdateSource,
    GlobalChart(String),
}

impl StatusField {
    /// Path segments from the document root.
    pub fn segments(&self) -> Vec<String> {
        match self {
            StatusField::IsUpdating => vec!["isUpdating".to_string()],
            StatusField::LatestSuccessfulUpdateSource => {
                vec!["latestSuccessfulUpdateSource".to_string()]
            }
            StatusField::GlobalChart(date) => vec!["globalCharts".to_string(), date.clone()],
        }
    }

    /// Dotted path, e.g. `globalCharts.2024-01-15`.
    pub fn path(&self) -> String {
        self.segments().join(".")
    }
}

/// One near-land grid cell's encoded forecast series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDocument {
    /// `"<lat 2dp>,<lon 2dp>"`
    pub id: String,
    pub forecast_start: DateTime<Utc>,
    pub temp_times_encoded: Vec<i32>,
}

/// Persistent store for the status record and forecast documents.
///
/// Status mutations are point updates of single fields; the record is never
/// replaced wholesale.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a point-in-time snapshot of the status record.
    async fn find_status(&self) -> StoreResult<StatusDocument>;

    /// Set one status field.
    async fn set_status_field(&self, field: &StatusField, value: Value) -> StoreResult<()>;

    /// Remove one status field.
    async fn unset_status_field(&self, field: &StatusField) -> StoreResult<()>;

    /// Atomically set `isUpdating` to true if it is currently false.
    /// Returns whether this caller won the claim.
    async fn claim_update(&self) -> StoreResult<bool>;

    /// Upsert a batch of forecast documents by id. Every document is
    /// attempted; failures are reported together once the batch is done.
    async fn bulk_upsert_forecasts(&self, docs: &[ForecastDocument]) -> StoreResult<()>;

    /// Look up a single forecast document.
    async fn find_forecast(&self, id: &str) -> StoreResult<Option<ForecastDocument>>;
}
