//! Whole-run tests over in-memory collaborators.

mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use common::{
    memory_storage, raw_grid, status_store, FixedResolver, RecordingPublisher, StaticOpener,
    StubIndices,
};
use renderer::ChartRenderer;
use storage::{MemoryDocumentStore, ObjectStorage, StatusDocument};
use test_utils::{assert_approx_eq, hourly_coords, mask_json, PREVIOUS_SOURCE_ID, SOURCE_ID};
use thermal_etl::archive::ARCHIVE_KEY;
use thermal_etl::{
    decode, ChartShifter, EtlDeps, EtlError, EtlJob, EtlSettings, GridArchive, NearLandMask,
    RunOutcome,
};
use w4h_common::RetryPolicy;

const LAT: [f64; 2] = [5.0, 5.25];
const LON: [f64; 2] = [10.0, 10.25];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

struct Harness {
    memory: MemoryDocumentStore,
    storage: Arc<ObjectStorage>,
    opener: Arc<StaticOpener>,
    publisher: Arc<RecordingPublisher>,
}

impl Harness {
    fn new(memory: MemoryDocumentStore) -> Self {
        Self::with_temperature(memory, |_, _, k| 20.0 + k as f32)
    }

    fn with_temperature(
        memory: MemoryDocumentStore,
        t2_c: impl Fn(usize, usize, usize) -> f32,
    ) -> Self {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
        let coords = hourly_coords(&LAT, &LON, start, 5);
        let grid = raw_grid(&coords, t2_c, |_, j, _| 10.0 + j as f32, (0.0, 0.0));

        Self {
            memory,
            storage: memory_storage(),
            opener: Arc::new(StaticOpener::new(grid)),
            publisher: Arc::new(RecordingPublisher::new(true)),
        }
    }

    fn job(&self, settings: EtlSettings) -> EtlJob {
        let mask = NearLandMask::from_json(&mask_json(&LAT, &LON, |i, j| i == 1 && j == 0))
            .unwrap();
        let deps = EtlDeps {
            status: status_store(&self.memory),
            documents: Arc::new(self.memory.clone()),
            archive: GridArchive::new(self.storage.clone()),
            resolver: Arc::new(FixedResolver(SOURCE_ID.to_string())),
            opener: self.opener.clone(),
            physics: Arc::new(StubIndices),
            mask,
            charts: ChartShifter::new(
                ChartRenderer::default(),
                self.publisher.clone(),
                status_store(&self.memory),
            ),
        };
        EtlJob::new(deps, settings)
    }

    fn opens(&self) -> usize {
        self.opener.opens.lock().unwrap().len()
    }
}

fn fast_settings() -> EtlSettings {
    EtlSettings {
        load_retry: RetryPolicy::immediate(1),
        open_retry: RetryPolicy::immediate(1),
        upload_retry: RetryPolicy::immediate(1),
        ..EtlSettings::default()
    }
}

fn seeded(is_updating: bool, latest: &str) -> MemoryDocumentStore {
    MemoryDocumentStore::with_status(&StatusDocument {
        is_updating,
        latest_successful_update_source: latest.to_string(),
        ..StatusDocument::default()
    })
    .unwrap()
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_run_publishes_near_land_cells_only() {
    let h = Harness::new(seeded(false, PREVIOUS_SOURCE_ID));

    let outcome = h.job(fast_settings()).run(now()).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {:?}", outcome);
    };
    assert_eq!(summary.source, SOURCE_ID);
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.parts, 1);
    assert_eq!(summary.steps, 5);

    let forecasts = h.memory.forecasts().await;
    assert_eq!(forecasts.keys().collect::<Vec<_>>(), vec!["5.25,10.00"]);

    let doc = &forecasts["5.25,10.00"];
    assert_eq!(doc.forecast_start, Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap());
    assert_eq!(doc.temp_times_encoded.len(), 5);
    for (k, &code) in doc.temp_times_encoded.iter().enumerate() {
        let (utci, wbgt, offset) = decode(code);
        assert_approx_eq!(utci, 20.0 + k as f32, 0.051);
        assert_approx_eq!(wbgt, 10.0, 0.051);
        assert_eq!(offset, k as u32);
    }
}

#[tokio::test]
async fn test_missing_values_off_the_coast_do_not_stop_the_run() {
    let h = Harness::with_temperature(seeded(false, PREVIOUS_SOURCE_ID), |i, j, k| {
        if (i, j, k) == (0, 1, 2) {
            f32::NAN
        } else {
            20.0 + k as f32
        }
    });

    let outcome = h.job(fast_settings()).run(now()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.documents == 1));

    let forecasts = h.memory.forecasts().await;
    assert_eq!(forecasts["5.25,10.00"].temp_times_encoded.len(), 5);
    assert_eq!(h.memory.status_json().await["latestSuccessfulUpdateSource"], SOURCE_ID);
    assert!(h.storage.get_optional(ARCHIVE_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn test_run_records_source_and_releases_gate() {
    let h = Harness::new(MemoryDocumentStore::new());

    h.job(fast_settings()).run(now()).await.unwrap();

    let body = h.memory.status_json().await;
    assert_eq!(body["isUpdating"], false);
    assert_eq!(body["latestSuccessfulUpdateSource"], SOURCE_ID);
    assert!(h.storage.get_optional(ARCHIVE_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn test_short_forecast_draws_no_charts() {
    let h = Harness::new(MemoryDocumentStore::new());

    let RunOutcome::Completed(summary) = h.job(fast_settings()).run(now()).await.unwrap() else {
        panic!("expected a completed run");
    };
    assert!(summary.charts.published.is_empty());
    assert_eq!(
        summary.charts.skipped_dates,
        vec![chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()]
    );
    assert!(h.publisher.files().is_empty());
}

// ============================================================================
// Gate and freshness checks
// ============================================================================

#[tokio::test]
async fn test_busy_gate_does_nothing() {
    let h = Harness::new(seeded(true, PREVIOUS_SOURCE_ID));

    let outcome = h.job(fast_settings()).run(now()).await.unwrap();

    assert_eq!(outcome, RunOutcome::AlreadyUpdating);
    assert_eq!(h.opens(), 0);
    assert_eq!(h.memory.bulk_calls(), 0);
    let body = h.memory.status_json().await;
    assert_eq!(body["isUpdating"], true);
    assert_eq!(body["latestSuccessfulUpdateSource"], PREVIOUS_SOURCE_ID);
}

#[tokio::test]
async fn test_latest_source_is_not_reprocessed() {
    let h = Harness::new(seeded(false, SOURCE_ID));

    let outcome = h.job(fast_settings()).run(now()).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::AlreadyLatest {
            source: SOURCE_ID.to_string()
        }
    );
    assert_eq!(h.opens(), 0);
    assert_eq!(h.memory.status_json().await["isUpdating"], false);
}

#[tokio::test]
async fn test_override_reprocesses_latest_source() {
    let h = Harness::new(seeded(false, SOURCE_ID));
    let settings = EtlSettings {
        source_override: Some(SOURCE_ID.to_string()),
        ..fast_settings()
    };

    let outcome = h.job(settings).run(now()).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(h.opener.opens.lock().unwrap().as_slice(), [SOURCE_ID.to_string()]);
}

#[tokio::test]
async fn test_rerun_merges_with_archive() {
    let h = Harness::new(MemoryDocumentStore::new());
    let settings = EtlSettings {
        source_override: Some(SOURCE_ID.to_string()),
        ..fast_settings()
    };

    let first = h.job(settings.clone()).run(now()).await.unwrap();
    let second = h.job(settings).run(now()).await.unwrap();

    let (RunOutcome::Completed(a), RunOutcome::Completed(b)) = (first, second) else {
        panic!("expected two completed runs");
    };
    assert_eq!(a.steps, b.steps);
    assert_eq!(h.memory.forecasts().await.len(), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_upload_releases_gate_and_keeps_source() {
    let h = Harness::new(seeded(false, PREVIOUS_SOURCE_ID));
    h.memory.fail_bulk_calls(100);

    let err = h.job(fast_settings()).run(now()).await.unwrap_err();

    assert!(matches!(err, EtlError::UploadExhausted { parts: 100, .. }));
    let body = h.memory.status_json().await;
    assert_eq!(body["isUpdating"], false);
    assert_eq!(body["latestSuccessfulUpdateSource"], PREVIOUS_SOURCE_ID);
    assert!(h.storage.get_optional(ARCHIVE_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_source_label_fails_before_claiming() {
    let h = Harness::new(MemoryDocumentStore::new());
    let settings = EtlSettings {
        source_override: Some("https://example.invalid/not-a-cycle".to_string()),
        ..fast_settings()
    };

    let err = h.job(settings).run(now()).await.unwrap_err();

    assert!(matches!(err, EtlError::SourceLabel(_)));
    assert_eq!(h.memory.status_json().await["isUpdating"], false);
    assert_eq!(h.opens(), 0);
}

#[tokio::test]
async fn test_status_outage_surfaces_as_store_error() {
    let h = Harness::new(MemoryDocumentStore::new());
    // more failures than the status store retries
    h.memory.fail_status_calls(10);

    let err = h.job(fast_settings()).run(now()).await.unwrap_err();
    assert!(matches!(err, EtlError::Store(_)));
}
