//! Coverage probing
//!
//! Determines, for one entity/metric pair, the earliest and latest timestamps
//! with data. The probe runs in stages that each short-circuit:
//!
//! 1. **Recency**: one query over the last `recent_days` days. A transient
//!    failure yields [`CoverageStatus::TransientError`]; no present point yields
//!    [`CoverageStatus::NoRecentData`]. Otherwise the latest timestamp is kept.
//! 2. **Year**: leftmost-true search over `floor_year..=now.year`, each year
//!    probed in 90-day windows until one has data.
//! 3. **Month**: same search over the months of the first year.
//! 4. **Day**: same search over the days of the first month.
//! 5. **Exact**: the first day is re-fetched at full resolution and the minimum
//!    timestamp with data becomes `earliest_ts`.
//!
//! A stage that finds nothing ends with [`CoverageStatus::LatestOnly`]. Errors
//! after stage 1 propagate to the caller.
//!
//! The search assumes that once data starts it continues. Every level falls
//! back to a linear scan when binary search finds nothing, but a gap in the
//! data can still make the reported start later than the true one.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fetcher::{FetcherError, FetcherResult, IodaApi, SignalsQuery};
use crate::identifier::CoverageKey;
use crate::{Entity, EntityType};

pub mod payload;
pub mod search;
pub mod store;

use payload::{payload_has_data, payload_time_bounds};
use search::{first_true, Probe, SearchPath};
pub use store::{CoverageStore, JsonFileCoverageStore, MemoryCoverageStore, StoreError};

/// Point budget of the recency query
pub const RECENT_MAX_POINTS: u32 = 256;
/// Length of the windows a year is probed in
pub const YEAR_PROBE_CHUNK_DAYS: i64 = 90;
/// Point budget of year and month probes
pub const COARSE_MAX_POINTS: u32 = 8;
/// Point budget of day probes
pub const DAY_MAX_POINTS: u32 = 32;
/// Point budget of the exact re-probe
pub const EXACT_MAX_POINTS: u32 = 10_000;
/// Default recency window in days
pub const DEFAULT_RECENT_DAYS: i64 = 30;
/// Default first year searched
pub const DEFAULT_FLOOR_YEAR: i32 = 2000;

/// Coverage errors
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    /// Probe failed after the recency stage
    #[error("probe failed: {0}")]
    Fetcher(#[from] FetcherError),

    /// Cache could not be read or written
    #[error("coverage cache error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome class of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    /// Both bounds located
    Ok,
    /// Nothing in the recency window
    NoRecentData,
    /// Recency query failed transiently
    TransientError,
    /// Recent data exists but no start was located
    LatestOnly,
}

impl CoverageStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Ok => "ok",
            CoverageStatus::NoRecentData => "no_recent_data",
            CoverageStatus::TransientError => "transient_error",
            CoverageStatus::LatestOnly => "latest_only",
        }
    }
}

impl std::fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeMethod {
    /// Recency query failed
    #[serde(rename = "probe_recent_failed")]
    RecentFailed,
    /// Recency query had no data
    #[serde(rename = "probe_recent_empty")]
    RecentEmpty,
    /// No year had data
    #[serde(rename = "probe_years_no_start")]
    YearsNoStart,
    /// No month of the first year had data
    #[serde(rename = "probe_months_no_start")]
    MonthsNoStart,
    /// No day of the first month had data
    #[serde(rename = "probe_days_no_start")]
    DaysNoStart,
    /// Full descent succeeded
    #[serde(rename = "probe_year_month_day")]
    YearMonthDay,
}

impl ProbeMethod {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::RecentFailed => "probe_recent_failed",
            ProbeMethod::RecentEmpty => "probe_recent_empty",
            ProbeMethod::YearsNoStart => "probe_years_no_start",
            ProbeMethod::MonthsNoStart => "probe_months_no_start",
            ProbeMethod::DaysNoStart => "probe_days_no_start",
            ProbeMethod::YearMonthDay => "probe_year_month_day",
        }
    }
}

impl std::fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one entity/metric pair
///
/// Serialized form is the coverage cache entry. `Ok` implies both bounds are
/// present with `earliest_ts <= latest_ts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageResult {
    /// Earliest timestamp with data, epoch seconds
    pub earliest_ts: Option<i64>,
    /// Latest timestamp with data, epoch seconds
    pub latest_ts: Option<i64>,
    /// Outcome class
    pub status: CoverageStatus,
    /// Producing stage
    pub method: ProbeMethod,
    /// When the probe ran
    pub checked_at_utc: String,
}

impl CoverageResult {
    fn terminal(
        status: CoverageStatus,
        method: ProbeMethod,
        latest_ts: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            earliest_ts: None,
            latest_ts,
            status,
            method,
            checked_at_utc: crate::isoformat_utc(now),
        }
    }
}

/// Where a discovery row's coverage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageSource {
    /// Read from the cache
    Cache,
    /// Freshly probed
    Probe,
}

impl CoverageSource {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageSource::Cache => "cache",
            CoverageSource::Probe => "probe",
        }
    }
}

/// One entity/metric coverage row produced by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRow {
    /// Entity kind
    pub entity_type: EntityType,
    /// Entity code
    pub entity_id: String,
    /// Datasource
    pub metric: String,
    /// Earliest timestamp with data
    pub coverage_min_ts: Option<i64>,
    /// Latest timestamp with data
    pub coverage_max_ts: Option<i64>,
    /// Outcome class
    pub coverage_status: CoverageStatus,
    /// Producing stage
    pub coverage_method: ProbeMethod,
    /// When the probe ran
    pub coverage_checked_at_utc: String,
    /// Cache hit or fresh probe
    pub coverage_source: CoverageSource,
}

impl CoverageRow {
    fn from_result(
        key: &CoverageKey,
        entity_type: EntityType,
        result: CoverageResult,
        source: CoverageSource,
    ) -> Self {
        Self {
            entity_type,
            entity_id: key.entity_code().to_string(),
            metric: key.metric().to_string(),
            coverage_min_ts: result.earliest_ts,
            coverage_max_ts: result.latest_ts,
            coverage_status: result.status,
            coverage_method: result.method,
            coverage_checked_at_utc: result.checked_at_utc,
            coverage_source: source,
        }
    }
}

/// Probes entity/metric pairs against an [`IodaApi`]
pub struct CoverageProber<'a, A: IodaApi + ?Sized> {
    api: &'a A,
    recent_days: i64,
    floor_year: i32,
}

impl<'a, A: IodaApi + ?Sized> CoverageProber<'a, A> {
    /// Prober with the default recency window and floor year
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            recent_days: DEFAULT_RECENT_DAYS,
            floor_year: DEFAULT_FLOOR_YEAR,
        }
    }

    /// Length of the recency window
    pub fn with_recent_days(mut self, days: i64) -> Self {
        self.recent_days = days;
        self
    }

    /// First year considered by the search
    pub fn with_floor_year(mut self, year: i32) -> Self {
        self.floor_year = year;
        self
    }

    /// Probe against the current clock
    pub async fn probe(
        &self,
        entity_type: EntityType,
        entity_code: &str,
        metric: &str,
    ) -> FetcherResult<CoverageResult> {
        self.probe_at(Utc::now(), entity_type, entity_code, metric).await
    }

    /// Probe with `now` as the clock
    ///
    /// # Errors
    /// Any request error after the recency stage
    pub async fn probe_at(
        &self,
        now: DateTime<Utc>,
        entity_type: EntityType,
        entity_code: &str,
        metric: &str,
    ) -> FetcherResult<CoverageResult> {
        let now = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .unwrap_or(now);
        let target = ProbeTarget {
            api: self.api,
            entity_type,
            entity_code,
            metric,
            now,
        };

        let recent_start = now - Duration::days(self.recent_days);
        let latest_ts = match target.window_bounds(recent_start, now, RECENT_MAX_POINTS).await {
            Err(e) if e.is_transient() => {
                warn!(
                    entity_type = %entity_type,
                    entity_code,
                    metric,
                    error = %e,
                    "Recency probe failed"
                );
                return Ok(CoverageResult::terminal(
                    CoverageStatus::TransientError,
                    ProbeMethod::RecentFailed,
                    None,
                    now,
                ));
            }
            Err(e) => return Err(e),
            Ok(None) | Ok(Some((_, None))) => {
                return Ok(CoverageResult::terminal(
                    CoverageStatus::NoRecentData,
                    ProbeMethod::RecentEmpty,
                    None,
                    now,
                ));
            }
            Ok(Some((_, Some(latest)))) => latest,
        };

        let years: Vec<u32> = (self.floor_year..=now.year())
            .filter_map(|y| u32::try_from(y).ok())
            .collect();
        let year_probe = target.stage(Stage::Year);
        let Some((year, path)) = first_true(&years, &year_probe).await? else {
            return Ok(CoverageResult::terminal(
                CoverageStatus::LatestOnly,
                ProbeMethod::YearsNoStart,
                Some(latest_ts),
                now,
            ));
        };
        log_stage("year", year, path);
        let year = year as i32;

        let months: Vec<u32> = (1..=12).collect();
        let month_probe = target.stage(Stage::Month { year });
        let Some((month, path)) = first_true(&months, &month_probe).await? else {
            return Ok(CoverageResult::terminal(
                CoverageStatus::LatestOnly,
                ProbeMethod::MonthsNoStart,
                Some(latest_ts),
                now,
            ));
        };
        log_stage("month", month, path);

        let days: Vec<u32> = (1..=days_to_probe(year, month, now)).collect();
        let day_probe = target.stage(Stage::Day { year, month });
        let Some((day, path)) = first_true(&days, &day_probe).await? else {
            return Ok(CoverageResult::terminal(
                CoverageStatus::LatestOnly,
                ProbeMethod::DaysNoStart,
                Some(latest_ts),
                now,
            ));
        };
        log_stage("day", day, path);

        let Some(day_start) = utc_date(year, month, day) else {
            return Ok(CoverageResult::terminal(
                CoverageStatus::LatestOnly,
                ProbeMethod::DaysNoStart,
                Some(latest_ts),
                now,
            ));
        };
        let day_end = (day_start + Duration::days(1)).min(now);
        let exact = target
            .window_bounds(day_start, day_end, EXACT_MAX_POINTS)
            .await?
            .and_then(|(min, _)| min);
        let earliest_ts = exact.unwrap_or_else(|| day_start.timestamp()).min(latest_ts);

        let result = CoverageResult {
            earliest_ts: Some(earliest_ts),
            latest_ts: Some(latest_ts),
            status: CoverageStatus::Ok,
            method: ProbeMethod::YearMonthDay,
            checked_at_utc: crate::isoformat_utc(now),
        };
        info!(
            entity_type = %entity_type,
            entity_code,
            metric,
            earliest_ts,
            latest_ts,
            "Coverage located"
        );
        Ok(result)
    }
}

fn log_stage(stage: &str, value: u32, path: SearchPath) {
    debug!(stage, value, ?path, "Located first candidate with data");
}

/// Number of days of `year-month` to search, clamped to `now`, at least 1
fn days_to_probe(year: i32, month: u32, now: DateTime<Utc>) -> u32 {
    let (Some(start), Some(end)) = (utc_date(year, month, 1), month_end(year, month)) else {
        return 1;
    };
    let end = end.min(now);
    let days = (end.date_naive() - start.date_naive()).num_days();
    if days <= 0 {
        1
    } else {
        days as u32
    }
}

fn utc_date(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
}

/// Start of the month after `year-month`
fn month_end(year: i32, month: u32) -> Option<DateTime<Utc>> {
    if month == 12 {
        utc_date(year + 1, 1, 1)
    } else {
        utc_date(year, month + 1, 1)
    }
}

/// Entity/metric pair under probe, with the clock fixed
struct ProbeTarget<'p, A: IodaApi + ?Sized> {
    api: &'p A,
    entity_type: EntityType,
    entity_code: &'p str,
    metric: &'p str,
    now: DateTime<Utc>,
}

impl<'p, A: IodaApi + ?Sized> ProbeTarget<'p, A> {
    fn stage(&self, stage: Stage) -> StageProbe<'_, 'p, A> {
        StageProbe { target: self, stage }
    }

    /// `None` when the window has no data, else its time bounds
    async fn window_bounds(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_points: u32,
    ) -> FetcherResult<Option<(Option<i64>, Option<i64>)>> {
        let query = SignalsQuery {
            entity_type: self.entity_type.as_str().to_string(),
            entity_code: self.entity_code.to_string(),
            from: start.timestamp(),
            until: end.timestamp(),
            datasource: Some(self.metric.to_string()),
            max_points: Some(max_points),
        };
        let response = self.api.signals_raw(&query).await?;
        crate::metrics::record_probe_request();
        if !payload_has_data(&response.json) {
            return Ok(None);
        }
        Ok(Some(payload_time_bounds(&response.json)))
    }

    async fn window_has_data(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_points: u32,
    ) -> FetcherResult<bool> {
        Ok(self.window_bounds(start, end, max_points).await?.is_some())
    }
}

/// Search level
#[derive(Debug, Clone, Copy)]
enum Stage {
    Year,
    Month { year: i32 },
    Day { year: i32, month: u32 },
}

struct StageProbe<'s, 'p, A: IodaApi + ?Sized> {
    target: &'s ProbeTarget<'p, A>,
    stage: Stage,
}

#[async_trait]
impl<A: IodaApi + ?Sized> Probe for StageProbe<'_, '_, A> {
    async fn has_data(&self, candidate: u32) -> FetcherResult<bool> {
        let target = self.target;
        let now = target.now;
        match self.stage {
            Stage::Year => {
                let year = candidate as i32;
                let Some(start) = utc_date(year, 1, 1) else {
                    return Ok(false);
                };
                let end = if year < now.year() {
                    utc_date(year + 1, 1, 1).unwrap_or(now)
                } else {
                    now
                };
                let mut cursor = start;
                while cursor < end {
                    let next = (cursor + Duration::days(YEAR_PROBE_CHUNK_DAYS)).min(end);
                    if target.window_has_data(cursor, next, COARSE_MAX_POINTS).await? {
                        return Ok(true);
                    }
                    cursor = next;
                }
                Ok(false)
            }
            Stage::Month { year } => {
                let (Some(start), Some(end)) =
                    (utc_date(year, candidate, 1), month_end(year, candidate))
                else {
                    return Ok(false);
                };
                if start >= now {
                    return Ok(false);
                }
                target.window_has_data(start, end.min(now), COARSE_MAX_POINTS).await
            }
            Stage::Day { year, month } => {
                let Some(start) = utc_date(year, month, candidate) else {
                    return Ok(false);
                };
                let end = (start + Duration::days(1)).min(now);
                target.window_has_data(start, end, DAY_MAX_POINTS).await
            }
        }
    }
}

/// Look up or probe coverage for every entity × metric pair.
///
/// Cache hits skip the prober unless `refresh` is set. Each fresh result is
/// written to `store` and flushed before the next pair is probed.
///
/// # Errors
/// Probe errors after the recency stage and cache write failures abort the run.
pub async fn discover_coverage<A: IodaApi + ?Sized>(
    prober: &CoverageProber<'_, A>,
    store: &mut dyn CoverageStore,
    entities: &[Entity],
    metrics: &[String],
    refresh: bool,
    progress: Option<&ProgressBar>,
) -> Result<Vec<CoverageRow>, CoverageError> {
    let mut rows = Vec::with_capacity(entities.len() * metrics.len());

    for entity in entities {
        for metric in metrics {
            let key = CoverageKey::new(entity.entity_type, entity.code.as_str(), metric.as_str());
            if let Some(pb) = progress {
                pb.set_message(key.to_string());
            }

            if !refresh {
                if let Some(cached) = store.get(&key) {
                    debug!(key = %key, "Coverage cache hit");
                    rows.push(CoverageRow::from_result(
                        &key,
                        entity.entity_type,
                        cached,
                        CoverageSource::Cache,
                    ));
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    continue;
                }
            }

            let result = prober.probe(entity.entity_type, &entity.code, metric).await?;
            crate::metrics::record_probe_result(result.status.as_str());
            store.set(key.clone(), result.clone());
            store.flush()?;
            rows.push(CoverageRow::from_result(
                &key,
                entity.entity_type,
                result,
                CoverageSource::Probe,
            ));
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }
    }

    store.flush()?;
    Ok(rows)
}
