//! Date parsing and fetch window resolution

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use super::job::FetchTarget;
use super::config::DEFAULT_LOOKBACK_DAYS;
use super::{DownloadError, DownloadResult};
use crate::TimeWindow;

/// Try epoch digits or an RFC 3339 datetime (an offset-less datetime is UTC).
fn try_parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = input.parse().ok()?;
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Parse a start bound from epoch digits, RFC 3339 or `YYYY-MM-DD`.
///
/// A bare date is the start of that day. Blank input is `None`.
pub fn parse_start_flexible(input: &str) -> DownloadResult<Option<DateTime<Utc>>> {
    parse_flexible(input, false)
}

/// Parse an end bound from epoch digits, RFC 3339 or `YYYY-MM-DD`.
///
/// A bare date becomes 23:59:59 UTC of that day so the date is included.
pub fn parse_end_flexible(input: &str) -> DownloadResult<Option<DateTime<Utc>>> {
    parse_flexible(input, true)
}

fn parse_flexible(input: &str, end_of_day: bool) -> DownloadResult<Option<DateTime<Utc>>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    if let Some(dt) = try_parse_datetime(input) {
        return Ok(Some(dt));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        DownloadError::ValidationError(format!("Unsupported date/time format: {input:?}"))
    })?;
    let (h, m, s) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
    let naive = date
        .and_hms_opt(h, m, s)
        .ok_or_else(|| DownloadError::ValidationError(format!("Invalid date: {input}")))?;
    Ok(Some(naive.and_utc()))
}

/// Resolve the window to fetch for one target.
///
/// # Arguments
/// * `explicit_start` / `explicit_end` - Bounds from flags or config
/// * `previous_max` - Last fetched timestamp, given only in incremental mode
/// * `now` - Clock used when no explicit end is given
///
/// Returns `None` when the resolved window is empty.
pub fn resolve_window(
    target: &FetchTarget,
    explicit_start: Option<DateTime<Utc>>,
    explicit_end: Option<DateTime<Utc>>,
    previous_max: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<TimeWindow> {
    let mut end = explicit_end.unwrap_or(now);
    if let Some(cov_end) = target
        .coverage_max_ts
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    {
        end = end.min(cov_end + Duration::days(1));
    }

    let start = match previous_max {
        Some(prev) => {
            let resume = prev + Duration::seconds(1);
            Some(explicit_start.map_or(resume, |s| s.max(resume)))
        }
        None => explicit_start,
    };
    let start = start
        .or_else(|| {
            target
                .coverage_min_ts
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        })
        .unwrap_or(end - Duration::days(DEFAULT_LOOKBACK_DAYS));

    let window = TimeWindow::new(start, end);
    if window.is_empty() {
        None
    } else {
        Some(window)
    }
}

/// Parse `YYYY-MM` into `(year, month)`
pub fn parse_month(input: &str) -> DownloadResult<(i32, u32)> {
    let invalid = || DownloadError::ValidationError(format!("Expected YYYY-MM, got: {input:?}"));
    let (year, month) = input.trim().split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// `[first day of month, first day of next month)` in UTC
pub fn month_window(year: i32, month: u32) -> DownloadResult<TimeWindow> {
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| DownloadError::ValidationError(format!("Invalid month {year}-{month}")))?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| DownloadError::ValidationError(format!("Invalid month {year}-{month}")))?;
    Ok(TimeWindow::new(start, end))
}

/// Month before the one containing `now`
pub fn previous_month(now: DateTime<Utc>) -> (i32, u32) {
    if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    }
}
