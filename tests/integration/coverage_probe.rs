//! Integration tests for the coverage prober against scripted data spans

use chrono::{DateTime, TimeZone, Utc};
use ioda_pipeline::coverage::{CoverageProber, CoverageStatus, ProbeMethod};
use ioda_pipeline::fetcher::FetcherError;
use ioda_pipeline::EntityType;

use crate::support::{interval_response, intervals_response, StubApi};

const MAR_14_2025_0630: i64 = 1_741_933_800;
const MAR_10_2005_0815: i64 = 1_110_442_500;
const JUN_01_2005: i64 = 1_117_584_000;
const DEC_15_2025: i64 = 1_765_756_800;
const JAN_01_2026: i64 = 1_767_225_600;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_probe_locates_exact_start() {
    let api = StubApi::new(|q| Ok(interval_response(q, MAR_14_2025_0630, i64::MAX)));
    let prober = CoverageProber::new(&api).with_floor_year(2020);

    let result = prober
        .probe_at(now(), EntityType::Country, "NG", "ping-slash24")
        .await
        .unwrap();

    assert_eq!(result.status, CoverageStatus::Ok);
    assert_eq!(result.method, ProbeMethod::YearMonthDay);
    assert_eq!(result.earliest_ts, Some(MAR_14_2025_0630));
    assert_eq!(result.latest_ts, Some(now().timestamp() - 1));
    assert_eq!(result.checked_at_utc, "2026-10-19T00:00:00Z");

    let calls = api.signal_calls();
    assert_eq!(calls[0].from, now().timestamp() - 30 * 86_400, "recency probe first");
    assert!(calls.iter().all(|q| q.datasource.as_deref() == Some("ping-slash24")));
    assert_eq!(calls.last().unwrap().max_points, Some(10_000), "exact probe last");
}

#[tokio::test]
async fn test_linear_fallback_finds_early_island() {
    // data in spring 2005 and again in late 2025; nothing in the current year
    let now = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
    let spans = [(MAR_10_2005_0815, JUN_01_2005), (DEC_15_2025, JAN_01_2026)];
    let api = StubApi::new(move |q| Ok(intervals_response(q, &spans)));
    let prober = CoverageProber::new(&api);

    let result = prober
        .probe_at(now, EntityType::Region, "1234", "bgp")
        .await
        .unwrap();

    assert_eq!(result.status, CoverageStatus::Ok);
    assert_eq!(result.earliest_ts, Some(MAR_10_2005_0815));
    assert_eq!(result.latest_ts, Some(JAN_01_2026 - 1));
}

#[tokio::test]
async fn test_no_recent_data_stops_after_one_request() {
    let api = StubApi::new(|q| Ok(interval_response(q, MAR_10_2005_0815, JUN_01_2005)));
    let prober = CoverageProber::new(&api);

    let result = prober
        .probe_at(now(), EntityType::Country, "GH", "bgp")
        .await
        .unwrap();

    assert_eq!(result.status, CoverageStatus::NoRecentData);
    assert_eq!(result.method, ProbeMethod::RecentEmpty);
    assert_eq!(result.earliest_ts, None);
    assert_eq!(result.latest_ts, None);
    assert_eq!(api.signal_call_count(), 1);
}

#[tokio::test]
async fn test_transient_recency_failure_is_recorded() {
    let api = StubApi::new(|_| Err(FetcherError::Transient("HTTP 502".into())));
    let prober = CoverageProber::new(&api);

    let result = prober
        .probe_at(now(), EntityType::Country, "GH", "bgp")
        .await
        .unwrap();

    assert_eq!(result.status, CoverageStatus::TransientError);
    assert_eq!(result.method, ProbeMethod::RecentFailed);
    assert_eq!(api.signal_call_count(), 1);
}

#[tokio::test]
async fn test_latest_only_when_no_year_qualifies() {
    let api = StubApi::new(|q| Ok(interval_response(q, 0, i64::MAX)));
    let prober = CoverageProber::new(&api).with_floor_year(2027);

    let result = prober
        .probe_at(now(), EntityType::Country, "SN", "bgp")
        .await
        .unwrap();

    assert_eq!(result.status, CoverageStatus::LatestOnly);
    assert_eq!(result.method, ProbeMethod::YearsNoStart);
    assert_eq!(result.earliest_ts, None);
    assert!(result.latest_ts.is_some());
}

#[tokio::test]
async fn test_api_error_after_recency_propagates() {
    let recent_start = now().timestamp() - 30 * 86_400;
    let api = StubApi::new(move |q| {
        if q.from >= recent_start {
            Ok(interval_response(q, 0, i64::MAX))
        } else {
            Err(FetcherError::Api("HTTP 404".into()))
        }
    });
    let prober = CoverageProber::new(&api);

    let err = prober
        .probe_at(now(), EntityType::Country, "SN", "bgp")
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::Api(_)));
}

#[tokio::test]
async fn test_transient_error_after_recency_propagates() {
    let recent_start = now().timestamp() - 30 * 86_400;
    let api = StubApi::new(move |q| {
        if q.from >= recent_start {
            Ok(interval_response(q, 0, i64::MAX))
        } else {
            Err(FetcherError::Transient("HTTP 503".into()))
        }
    });
    let prober = CoverageProber::new(&api);

    let err = prober
        .probe_at(now(), EntityType::Country, "SN", "bgp")
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::Transient(ref msg) if msg == "HTTP 503"));
    assert_eq!(api.signal_call_count(), 2);
}

#[tokio::test]
async fn test_exact_start_across_years_months_and_days() {
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 13, 0, 0).unwrap();
    let starts = [
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2000, 1, 1, 12, 34, 56).unwrap(),
        Utc.with_ymd_and_hms(2001, 12, 31, 23, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2008, 7, 15, 6, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2016, 2, 29, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2016, 2, 29, 23, 59, 59).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 12, 31, 18, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 10, 18, 22, 0, 0).unwrap(),
    ];

    for start in starts {
        let start_ts = start.timestamp();
        let api = StubApi::new(move |q| Ok(interval_response(q, start_ts, i64::MAX)));
        let prober = CoverageProber::new(&api).with_floor_year(2000);

        let result = prober
            .probe_at(now, EntityType::Country, "NG", "bgp")
            .await
            .unwrap();

        assert_eq!(result.status, CoverageStatus::Ok, "start {start}");
        assert_eq!(result.earliest_ts, Some(start_ts), "start {start}");
        assert_eq!(result.latest_ts, Some(now.timestamp() - 1), "start {start}");
    }
}
