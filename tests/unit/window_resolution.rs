//! Unit tests for fetch window resolution and date parsing

use chrono::{DateTime, Duration, TimeZone, Utc};
use ioda_pipeline::downloader::window::{month_window, parse_month, previous_month};
use ioda_pipeline::downloader::{
    parse_end_flexible, parse_start_flexible, resolve_window, FetchTarget,
};
use ioda_pipeline::EntityType;

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn target_with_coverage(min: Option<i64>, max: Option<i64>) -> FetchTarget {
    let mut target = FetchTarget::new(EntityType::Country, "NG", "bgp");
    target.coverage_min_ts = min;
    target.coverage_max_ts = max;
    target
}

#[test]
fn test_end_is_clamped_to_coverage_plus_one_day() {
    let now = utc(2026, 10, 19);
    let cov_max = utc(2026, 9, 1).timestamp();
    let target = target_with_coverage(None, Some(cov_max));

    let window = resolve_window(&target, None, None, None, now).unwrap();
    assert_eq!(window.end, utc(2026, 9, 2));
    assert_eq!(window.start, utc(2026, 9, 2) - Duration::days(30));

    // an explicit end before the clamp wins
    let window = resolve_window(&target, None, Some(utc(2026, 8, 1)), None, now).unwrap();
    assert_eq!(window.end, utc(2026, 8, 1));
}

#[test]
fn test_default_start_is_thirty_days_before_end() {
    let now = utc(2026, 10, 19);
    let target = target_with_coverage(None, None);
    let window = resolve_window(&target, None, None, None, now).unwrap();
    assert_eq!(window.end, now);
    assert_eq!(window.start, utc(2026, 9, 19));
}

#[test]
fn test_coverage_start_used_without_explicit_start() {
    let now = utc(2026, 10, 19);
    let target = target_with_coverage(Some(utc(2024, 5, 1).timestamp()), None);
    let window = resolve_window(&target, None, None, None, now).unwrap();
    assert_eq!(window.start, utc(2024, 5, 1));

    let window = resolve_window(&target, Some(utc(2026, 1, 1)), None, None, now).unwrap();
    assert_eq!(window.start, utc(2026, 1, 1));
}

#[test]
fn test_incremental_start_follows_previous_run() {
    let now = utc(2026, 10, 19);
    let target = target_with_coverage(Some(utc(2020, 1, 1).timestamp()), None);
    let previous = utc(2026, 10, 1);

    let window = resolve_window(&target, None, None, Some(previous), now).unwrap();
    assert_eq!(window.start, previous + Duration::seconds(1));

    // an explicit start later than the previous run is kept
    let window =
        resolve_window(&target, Some(utc(2026, 10, 10)), None, Some(previous), now).unwrap();
    assert_eq!(window.start, utc(2026, 10, 10));
}

#[test]
fn test_empty_window_is_none() {
    let now = utc(2026, 10, 19);
    let target = target_with_coverage(None, None);
    assert!(resolve_window(&target, None, None, Some(now), now).is_none());
    assert!(resolve_window(&target, Some(utc(2026, 11, 1)), None, None, now).is_none());
}

#[test]
fn test_flexible_dates() {
    assert_eq!(
        parse_start_flexible("2026-02-20").unwrap(),
        Some(utc(2026, 2, 20))
    );
    assert_eq!(
        parse_end_flexible("2026-02-20").unwrap(),
        Some(Utc.with_ymd_and_hms(2026, 2, 20, 23, 59, 59).unwrap())
    );
    assert_eq!(
        parse_start_flexible("1771545600").unwrap(),
        Some(utc(2026, 2, 20))
    );
    assert_eq!(
        parse_end_flexible("2026-02-20T05:00:00+02:00").unwrap(),
        Some(Utc.with_ymd_and_hms(2026, 2, 20, 3, 0, 0).unwrap())
    );
    assert_eq!(
        parse_start_flexible("2026-02-20T05:00:00").unwrap(),
        Some(Utc.with_ymd_and_hms(2026, 2, 20, 5, 0, 0).unwrap())
    );
    assert_eq!(parse_start_flexible("  ").unwrap(), None);
    assert!(parse_start_flexible("Feb 20").is_err());
}

#[test]
fn test_month_helpers() {
    assert_eq!(parse_month("2026-02").unwrap(), (2026, 2));
    assert!(parse_month("2026-2").is_err());
    assert!(parse_month("2026-00").is_err());

    let feb = month_window(2026, 2).unwrap();
    assert_eq!((feb.end - feb.start).num_days(), 28);
    let dec = month_window(2025, 12).unwrap();
    assert_eq!(dec.end, utc(2026, 1, 1));

    assert_eq!(previous_month(utc(2026, 10, 19)), (2026, 9));
    assert_eq!(previous_month(utc(2026, 1, 3)), (2025, 12));
}
