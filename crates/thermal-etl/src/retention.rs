//! How much history the merged grid has to keep.

use chrono::{DateTime, Duration, Utc};
use w4h_common::floor_to_day;

/// Retention bounds derived from the wall clock and the new forecast start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Start of the current local day anywhere on the globe: local days start
    /// at most 25 hours ago (24 plus one for daylight saving).
    pub local_day_start: DateTime<Utc>,
    /// Current UTC-labelled date at hour angle -11.
    pub haa_utc_today: DateTime<Utc>,
    /// Oldest chart date that can still be shown ("yesterday" everywhere).
    pub earliest_chart_date: DateTime<Utc>,
    /// Oldest data a redrawn chart needs; shifting moves data forward by up
    /// to 12 hours.
    pub earliest_chart_data: DateTime<Utc>,
    /// Prior data older than this is discarded.
    pub cutoff: DateTime<Utc>,
}

impl RetentionPlan {
    pub fn compute(now: DateTime<Utc>, first_new_timestamp: DateTime<Utc>) -> Self {
        let local_day_start = floor_to_day(now - Duration::hours(25));
        let haa_utc_today = floor_to_day(now - Duration::hours(11));
        let earliest_chart_date = haa_utc_today - Duration::days(1);
        let earliest_chart_data = floor_to_day(first_new_timestamp) - Duration::hours(12);

        Self {
            local_day_start,
            haa_utc_today,
            earliest_chart_date,
            earliest_chart_data,
            cutoff: local_day_start.min(earliest_chart_data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plan_for_morning_run() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
        let plan = RetentionPlan::compute(now, first);

        assert_eq!(plan.local_day_start, Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap());
        assert_eq!(plan.haa_utc_today, Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap());
        assert_eq!(
            plan.earliest_chart_date,
            Utc.with_ymd_and_hms(2024, 1, 13, 0, 0, 0).unwrap()
        );
        assert_eq!(
            plan.earliest_chart_data,
            Utc.with_ymd_and_hms(2024, 1, 14, 12, 0, 0).unwrap()
        );
        assert_eq!(plan.cutoff, plan.local_day_start);
    }

    #[test]
    fn test_chart_data_bound_wins_for_stale_forecast() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 14, 1, 0, 0).unwrap();
        let plan = RetentionPlan::compute(now, first);
        assert_eq!(plan.cutoff, Utc.with_ymd_and_hms(2024, 1, 13, 12, 0, 0).unwrap());
    }
}
