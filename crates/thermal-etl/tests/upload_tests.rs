//! Tests for the chunked forecast upload.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use storage::{ForecastDocument, MemoryDocumentStore};
use thermal_etl::{encode, EtlError, UploadOrchestrator};
use w4h_common::RetryPolicy;

fn docs(n: usize) -> Vec<ForecastDocument> {
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
    (0..n)
        .map(|i| ForecastDocument {
            id: format!("{:.2},{:.2}", 5.0 + 0.25 * i as f64, 10.0),
            forecast_start: start,
            temp_times_encoded: (0..3).map(|k| encode(20.0, 10.0, k)).collect(),
        })
        .collect()
}

fn orchestrator(memory: &MemoryDocumentStore) -> UploadOrchestrator {
    UploadOrchestrator::new(Arc::new(memory.clone())).with_policy(RetryPolicy::immediate(1))
}

// ============================================================================
// Escalation
// ============================================================================

#[tokio::test]
async fn test_first_count_succeeds_without_faults() {
    let memory = MemoryDocumentStore::new();

    let parts = orchestrator(&memory).upload(&docs(3)).await.unwrap();

    assert_eq!(parts, 12);
    // empty parts are never sent
    assert_eq!(memory.bulk_calls(), 3);
    assert_eq!(memory.forecasts().await.len(), 3);
}

#[tokio::test]
async fn test_failed_part_escalates_to_next_count() {
    let memory = MemoryDocumentStore::new();
    memory.fail_bulk_calls(1);

    let parts = orchestrator(&memory).upload(&docs(3)).await.unwrap();

    assert_eq!(parts, 13);
    assert_eq!(memory.bulk_calls(), 4);
    assert_eq!(memory.forecasts().await.len(), 3);
}

#[tokio::test]
async fn test_exhausted_schedule_reports_last_count() {
    let memory = MemoryDocumentStore::new();
    memory.fail_bulk_calls(u32::MAX);

    let err = orchestrator(&memory)
        .with_counts(vec![2, 4])
        .upload(&docs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::UploadExhausted { parts: 4, .. }));
    assert_eq!(memory.bulk_calls(), 2);
    assert!(memory.forecasts().await.is_empty());
}

#[tokio::test]
async fn test_empty_schedule_uploads_in_one_part() {
    let memory = MemoryDocumentStore::new();

    let parts = orchestrator(&memory)
        .with_counts(Vec::new())
        .upload(&docs(4))
        .await
        .unwrap();

    assert_eq!(parts, 1);
    assert_eq!(memory.bulk_calls(), 1);
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_repeated_upload_leaves_same_documents() {
    let memory = MemoryDocumentStore::new();
    let batch = docs(7);

    orchestrator(&memory).upload(&batch).await.unwrap();
    let once = memory.forecasts().await;
    orchestrator(&memory).upload(&batch).await.unwrap();
    let twice = memory.forecasts().await;

    assert_eq!(once, twice);
    assert_eq!(twice.len(), 7);
}

#[tokio::test]
async fn test_upload_replaces_existing_documents() {
    let memory = MemoryDocumentStore::new();
    let mut batch = docs(2);
    orchestrator(&memory).upload(&batch).await.unwrap();

    batch[0].temp_times_encoded = vec![encode(30.0, 20.0, 0)];
    orchestrator(&memory).upload(&batch).await.unwrap();

    let stored = memory.forecasts().await;
    assert_eq!(stored["5.00,10.00"].temp_times_encoded, vec![encode(30.0, 20.0, 0)]);
    assert_eq!(stored.len(), 2);
}
