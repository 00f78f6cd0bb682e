//! Tests for the OPeNDAP dataset reader against a mock server.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use thermal_etl::{OpendapOpener, SourceError, SourceOpener};
use w4h_common::BoundingBox;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const DATASET: &str = "/dods/gfs_0p25_1hr/gfs20240115/gfs_0p25_1hr_06z";

const DDS: &str = "Dataset {
    Float64 time[time = 3];
    Float64 lat[lat = 3];
    Float64 lon[lon = 4];
    Grid {
     ARRAY:
        Float32 tmp2m[time = 3][lat = 3][lon = 4];
     MAPS:
        Float64 time[time = 3];
        Float64 lat[lat = 3];
        Float64 lon[lon = 4];
    } tmp2m;
} gfs_0p25_1hr_06z;";

const TMP2M: &str = "tmp2m, [2][2][2]
[0][0], 1.0, 2.0
[0][1], 3.0, 4.0
[1][0], 5.0, 6.0
[1][1], 7.0, 8.0

time, [2]
738900.2916666666, 738900.3333333334
lat, [2]
0.0, 0.25
lon, [2]
0.25, 0.5
";

/// Matches requests whose raw query string starts with a prefix.
struct QueryPrefix(&'static str);

impl Match for QueryPrefix {
    fn matches(&self, request: &Request) -> bool {
        request
            .url
            .query()
            .is_some_and(|query| query.starts_with(self.0))
    }
}

async fn mount_dataset(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}.dds", DATASET)))
        .respond_with(ResponseTemplate::new(200).set_body_string(DDS))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}.ascii", DATASET)))
        .and(QueryPrefix("lat[0:2]"))
        .respond_with(ResponseTemplate::new(200).set_body_string("lat, [3]\n-0.25, 0.0, 0.25\n"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}.ascii", DATASET)))
        .and(QueryPrefix("lon[0:3]"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("lon, [4]\n0.0, 0.25, 0.5, 0.75\n"),
        )
        .mount(server)
        .await;
}

fn bbox() -> BoundingBox {
    BoundingBox::new(0.25, 0.0, 0.5, 0.25)
}

fn opener() -> OpendapOpener {
    OpendapOpener::new(Duration::from_secs(5)).unwrap()
}

// ============================================================================
// Opening
// ============================================================================

#[tokio::test]
async fn test_open_restricts_axes_to_limits() {
    let server = MockServer::start().await;
    mount_dataset(&server).await;
    let source_id = format!("{}{}", server.uri(), DATASET);

    let source = opener().open(&source_id, &bbox()).await.unwrap();

    let coords = source.coords();
    assert_eq!(coords.lat, vec![0.0, 0.25]);
    assert_eq!(coords.lon, vec![0.25, 0.5]);
    // hour 0 is skipped
    assert_eq!(
        coords.time,
        vec![
            Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap(),
        ]
    );
    assert_eq!(source.id(), source_id);
}

#[tokio::test]
async fn test_open_fails_when_limits_miss_the_grid() {
    let server = MockServer::start().await;
    mount_dataset(&server).await;
    let source_id = format!("{}{}", server.uri(), DATASET);

    let far_away = BoundingBox::new(100.0, 40.0, 110.0, 50.0);
    let err = opener().open(&source_id, &far_away).await.err().unwrap();
    assert!(matches!(err, SourceError::NotFound(_)));
}

#[tokio::test]
async fn test_missing_dataset_is_not_transient() {
    let server = MockServer::start().await;
    let source_id = format!("{}{}", server.uri(), DATASET);

    let err = opener().open(&source_id, &bbox()).await.err().unwrap();
    assert!(matches!(err, SourceError::Http { status: 404, .. }));
    assert!(!err.is_transient());
}

// ============================================================================
// Materialization
// ============================================================================

#[tokio::test]
async fn test_materialize_reorders_into_grid_layout() {
    let server = MockServer::start().await;
    mount_dataset(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}.ascii", DATASET)))
        .and(QueryPrefix("tmp2m[1:2][1:2][1:2]"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TMP2M))
        .expect(1)
        .mount(&server)
        .await;
    let source_id = format!("{}{}", server.uri(), DATASET);

    let source = opener().open(&source_id, &bbox()).await.unwrap();
    let field = source.materialize("tmp2m").await.unwrap();

    let coords = source.coords();
    let series = |i, j| {
        let start = coords.index(i, j, 0);
        field.values()[start..start + 2].to_vec()
    };
    assert_eq!(series(0, 0), vec![1.0, 5.0]);
    assert_eq!(series(0, 1), vec![2.0, 6.0]);
    assert_eq!(series(1, 1), vec![4.0, 8.0]);
}

#[tokio::test]
async fn test_unknown_variable_is_rejected_without_request() {
    let server = MockServer::start().await;
    mount_dataset(&server).await;
    let source_id = format!("{}{}", server.uri(), DATASET);

    let source = opener().open(&source_id, &bbox()).await.unwrap();
    let err = source.materialize("dpt2m").await.unwrap_err();

    assert!(matches!(err, SourceError::MissingVariable(ref v) if v == "dpt2m"));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    mount_dataset(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}.ascii", DATASET)))
        .and(QueryPrefix("tmp2m"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let source_id = format!("{}{}", server.uri(), DATASET);

    let source = opener().open(&source_id, &bbox()).await.unwrap();
    let err = source.materialize("tmp2m").await.unwrap_err();

    assert!(err.is_transient());
}
