//! Common test fixtures for the ETL tests.

/// A GFS 0.25° hourly source id for the 06z cycle of 2024-01-15.
pub const SOURCE_ID: &str =
    "https://nomads.ncep.noaa.gov/dods/gfs_0p25_1hr/gfs20240115/gfs_0p25_1hr_06z";

/// The 00z cycle of the same day.
pub const PREVIOUS_SOURCE_ID: &str =
    "https://nomads.ncep.noaa.gov/dods/gfs_0p25_1hr/gfs20240115/gfs_0p25_1hr_00z";

/// `LIMITS` values as they appear in configuration.
pub mod limits {
    /// Whole globe in GFS longitudes
    pub const GLOBE: &str = r#"{"north": 90, "south": -90, "east": 359.75, "west": 0}"#;

    /// A small box over the Gulf of Guinea coast
    pub const SMALL: &str = r#"{"north": 5.5, "south": 5.0, "east": 1.0, "west": 0.0}"#;

    /// South above north
    pub const INVERTED: &str = r#"{"north": 0, "south": 10, "east": 20, "west": 0}"#;
}

/// Near-land mask JSON over the given axes.
///
/// `near_land(i, j)` decides each cell.
pub fn mask_json(lat: &[f64], lon: &[f64], near_land: impl Fn(usize, usize) -> bool) -> String {
    let mut cells = Vec::with_capacity(lat.len() * lon.len());
    for i in 0..lat.len() {
        for j in 0..lon.len() {
            cells.push(u8::from(near_land(i, j)));
        }
    }
    serde_json::json!({
        "lat": lat,
        "lon": lon,
        "nearLand": cells,
    })
    .to_string()
}

/// A status record body as stored.
pub fn status_json(
    is_updating: bool,
    latest_source: &str,
    charts: &[(&str, &str)],
) -> serde_json::Value {
    let charts: serde_json::Map<String, serde_json::Value> = charts
        .iter()
        .map(|(date, label)| (date.to_string(), serde_json::Value::String(label.to_string())))
        .collect();
    serde_json::json!({
        "isUpdating": is_updating,
        "latestSuccessfulUpdateSource": latest_source,
        "globalCharts": charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_json_layout() {
        let json = mask_json(&[0.0, 1.0], &[5.0, 6.0], |i, j| i == 1 && j == 0);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nearLand"], serde_json::json!([0, 0, 1, 0]));
    }

    #[test]
    fn test_status_json() {
        let body = status_json(true, SOURCE_ID, &[("2024-01-15", "2024-01-15_06z")]);
        assert_eq!(body["isUpdating"], true);
        assert_eq!(body["globalCharts"]["2024-01-15"], "2024-01-15_06z");
    }
}
