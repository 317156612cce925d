//! Integration tests for the month → week → day chunk ladder

use chrono::{DateTime, TimeZone, Utc};
use ioda_pipeline::downloader::{ChunkFetcher, ChunkOptions, DownloadError, FetchSummary, FetchTarget};
use ioda_pipeline::fetcher::{FetcherError, RawResponse};
use ioda_pipeline::output::RawPathBuilder;
use ioda_pipeline::{EntityType, Granularity, TimeWindow};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{series_payload, small_response, StubApi};

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn target() -> FetchTarget {
    FetchTarget::new(EntityType::Country, "NG", "ping-slash24")
}

fn count_files(dir: &std::path::Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_two_day_window_at_day_granularity() {
    let temp_dir = TempDir::new().unwrap();
    let api = StubApi::always_small();
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 2, 20), utc(2026, 2, 22));
    let planned = fetcher
        .fetch_target(&target(), window, Granularity::Day, &mut summary)
        .await
        .unwrap();

    assert!(planned.is_empty());
    assert_eq!(summary.planned_chunks, 2);
    assert_eq!(summary.written_chunks, 2);
    assert_eq!(summary.errors, 0);

    let paths = RawPathBuilder::new(temp_dir.path(), EntityType::Country, "ping-slash24", "NG");
    let first = paths.chunk(&TimeWindow::new(utc(2026, 2, 20), utc(2026, 2, 21)));
    assert!(first.ends_with("country/ping-slash24/NG/1771545600_1771632000.json"));
    assert!(first.exists());
    let body: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
    assert_eq!(body["data"][0][0]["entityCode"], "NG");
}

#[tokio::test]
async fn test_rerun_skips_existing_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let api = StubApi::always_small();
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());
    let window = TimeWindow::new(utc(2026, 2, 20), utc(2026, 2, 23));

    let mut first = FetchSummary::default();
    fetcher
        .fetch_target(&target(), window, Granularity::Day, &mut first)
        .await
        .unwrap();
    assert_eq!(first.written_chunks, 3);
    assert_eq!(api.signal_call_count(), 3);

    let mut second = FetchSummary::default();
    fetcher
        .fetch_target(&target(), window, Granularity::Day, &mut second)
        .await
        .unwrap();
    assert_eq!(second.written_chunks, 0);
    assert_eq!(second.skipped_existing, 3);
    assert_eq!(api.signal_call_count(), 3, "no request for chunks on disk");

    let overwrite = ChunkFetcher::new(
        &api,
        temp_dir.path(),
        ChunkOptions {
            overwrite: true,
            ..Default::default()
        },
    );
    let mut third = FetchSummary::default();
    overwrite
        .fetch_target(&target(), window, Granularity::Day, &mut third)
        .await
        .unwrap();
    assert_eq!(third.written_chunks, 3);
    assert_eq!(api.signal_call_count(), 6);
}

#[tokio::test]
async fn test_oversize_month_descends_to_days() {
    let temp_dir = TempDir::new().unwrap();
    // anything wider than a day comes back with a large body
    let api = StubApi::new(|q| {
        if q.until - q.from > 86_400 {
            let values = vec![json!(1.0); 2_000];
            let payload = series_payload(q, q.from, 300, values);
            Ok(RawResponse::from_json("stub://large", payload))
        } else {
            Ok(small_response(q))
        }
    });
    let options = ChunkOptions {
        max_response_bytes: 4_000,
        ..Default::default()
    };
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), options);

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 2, 1), utc(2026, 3, 1));
    fetcher
        .fetch_target(&target(), window, Granularity::Month, &mut summary)
        .await
        .unwrap();

    // 1 month + 4 weeks + 28 days
    assert_eq!(summary.planned_chunks, 33);
    assert_eq!(summary.written_chunks, 28);
    assert_eq!(summary.errors, 0);

    let dir = RawPathBuilder::new(temp_dir.path(), EntityType::Country, "ping-slash24", "NG")
        .directory();
    assert_eq!(count_files(&dir), 28, "only day files are written");

    // sub-windows are visited in chronological order
    let calls = api.signal_calls();
    let days: Vec<i64> = calls
        .iter()
        .filter(|q| q.until - q.from == 86_400)
        .map(|q| q.from)
        .collect();
    let mut sorted = days.clone();
    sorted.sort_unstable();
    assert_eq!(days, sorted);
}

#[tokio::test]
async fn test_persistent_transient_failure_terminates_at_day() {
    let temp_dir = TempDir::new().unwrap();
    let api = StubApi::new(|_| Err(FetcherError::Transient("HTTP 503".into())));
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 2, 2), utc(2026, 2, 9));
    let err = fetcher
        .fetch_target(&target(), window, Granularity::Week, &mut summary)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(summary.planned_chunks, 8);
    assert_eq!(summary.errors, 7);
    assert_eq!(summary.written_chunks, 0);
    assert_eq!(api.signal_call_count(), 8);
}

#[tokio::test]
async fn test_persistent_transient_failure_from_month_terminates() {
    let temp_dir = TempDir::new().unwrap();
    let api = StubApi::new(|_| Err(FetcherError::Transient("HTTP 503".into())));
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());

    // two month chunks: 31 days in 5 weeks, then 16 days in 3 weeks
    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 1, 15), utc(2026, 3, 3));
    let err = fetcher
        .fetch_target(&target(), window, Granularity::Month, &mut summary)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(summary.planned_chunks, 57);
    assert_eq!(summary.errors, 47);
    assert_eq!(summary.written_chunks, 0);
    assert_eq!(api.signal_call_count(), 57);
}

#[tokio::test]
async fn test_persistent_transient_failure_at_day_start() {
    let temp_dir = TempDir::new().unwrap();
    let api = StubApi::new(|_| Err(FetcherError::Transient("HTTP 503".into())));
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 2, 20), utc(2026, 2, 23));
    let err = fetcher
        .fetch_target(&target(), window, Granularity::Day, &mut summary)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(summary.planned_chunks, 3);
    assert_eq!(summary.errors, 3);
    assert_eq!(summary.written_chunks, 0);
    assert_eq!(api.signal_call_count(), 3);
}

#[tokio::test]
async fn test_day_failure_is_deferred_until_the_window_is_done() {
    let temp_dir = TempDir::new().unwrap();
    let bad_day = utc(2026, 2, 21).timestamp();
    let api = StubApi::new(move |q| {
        if q.from == bad_day {
            Err(FetcherError::Transient("timeout".into()))
        } else {
            Ok(small_response(q))
        }
    });
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 2, 20), utc(2026, 2, 23));
    let result = fetcher
        .fetch_target(&target(), window, Granularity::Day, &mut summary)
        .await;

    assert!(matches!(
        result,
        Err(DownloadError::Fetcher(FetcherError::Transient(_)))
    ));
    assert_eq!(summary.planned_chunks, 3);
    assert_eq!(summary.written_chunks, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(api.signal_call_count(), 3);
}

#[tokio::test]
async fn test_api_error_aborts_target() {
    let temp_dir = TempDir::new().unwrap();
    let bad_day = utc(2026, 2, 21).timestamp();
    let api = StubApi::new(move |q| {
        if q.from == bad_day {
            Err(FetcherError::Api("HTTP 400: unknown datasource".into()))
        } else {
            Ok(small_response(q))
        }
    });
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), ChunkOptions::default());

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 2, 20), utc(2026, 2, 23));
    let result = fetcher
        .fetch_target(&target(), window, Granularity::Day, &mut summary)
        .await;

    assert!(matches!(
        result,
        Err(DownloadError::Fetcher(FetcherError::Api(_)))
    ));
    assert_eq!(summary.planned_chunks, 2);
    assert_eq!(summary.written_chunks, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(api.signal_call_count(), 2, "third day never requested");
}

#[tokio::test]
async fn test_dry_run_plans_without_requests() {
    let temp_dir = TempDir::new().unwrap();
    let api = StubApi::always_small();
    let options = ChunkOptions {
        dry_run: true,
        ..Default::default()
    };
    let fetcher = ChunkFetcher::new(&api, temp_dir.path(), options);

    let mut summary = FetchSummary::default();
    let window = TimeWindow::new(utc(2026, 1, 15), utc(2026, 3, 1));
    let planned = fetcher
        .fetch_target(&target(), window, Granularity::Month, &mut summary)
        .await
        .unwrap();

    assert_eq!(planned.len(), 2);
    assert_eq!(summary.dry_run_chunks, 2);
    assert_eq!(summary.written_chunks, 0);
    assert_eq!(api.signal_call_count(), 0);
    assert_eq!(
        planned[0].to_string(),
        "2026-01-15T00:00:00+00:00 -> 2026-02-15T00:00:00+00:00 [month]"
    );
    assert_eq!(planned[1].window.end, utc(2026, 3, 1));
    assert!(!temp_dir.path().join("country").exists());
}
