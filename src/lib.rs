//! # IODA Pipeline Library
//!
//! Discovers measurement entities and datasources from the IODA network-telemetry
//! API, probes how far back each entity/metric pair has data, fetches raw signal
//! windows into an idempotent on-disk archive, and reshapes the archive into long
//! and wide tables with a QA pass on top.
//!
//! ## Features
//!
//! - **Coverage probing**: year → month → day leftmost-true search with a linear
//!   fallback, cached per entity/metric
//! - **Adaptive chunking**: month → week → day granularity ladder for oversize or
//!   transiently failing windows
//! - **Idempotent archive**: one JSON body per window, skipped when already present
//! - **Rate limiting**: minimum interval between requests, owned by the client
//! - **Normalisation**: long table, per-level wide panels and QA statistics as CSV
//!
//! ## Quick Start
//!
//! ```no_run
//! use ioda_pipeline::config::PipelineConfig;
//! use ioda_pipeline::downloader::{ChunkFetcher, ChunkOptions, FetchSummary, FetchTarget};
//! use ioda_pipeline::fetcher::ioda_http::IodaHttpClient;
//! use ioda_pipeline::{EntityType, Granularity, TimeWindow};
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::embedded()?;
//! let client = IodaHttpClient::new(&config.fetch_defaults.request)?;
//! let fetcher = ChunkFetcher::new(&client, "data/raw", ChunkOptions::default());
//!
//! let target = FetchTarget::new(EntityType::Country, "NG", "ping-slash24");
//! let window = TimeWindow::new(
//!     Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
//! );
//! let mut summary = FetchSummary::default();
//! fetcher.fetch_target(&target, window, Granularity::Month, &mut summary).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - HTTP client, error kinds and the [`fetcher::IodaApi`] seam
//! - [`coverage`] - Coverage prober, search helpers and the coverage cache
//! - [`downloader`] - Chunk ladder, fetch targets, window resolution, rate limiting
//! - [`catalog`] - Entity resolution and the entity × metric catalog
//! - [`transform`] - Raw JSON → long table → wide panels
//! - [`qa`] - Per-series QA statistics and report
//! - [`output`] - Path layout and CSV persistence
//! - [`config`] - TOML pipeline configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Entity catalog and discovery
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Pipeline configuration
pub mod config;

/// Coverage probing
pub mod coverage;

/// Chunked fetch orchestration and rate limiting
pub mod downloader;

/// API access
pub mod fetcher;

/// Coverage cache keys
pub mod identifier;

/// Prometheus metrics
pub mod metrics;

/// Path layout and CSV persistence
pub mod output;

/// QA summaries
pub mod qa;

/// Ctrl+C coordination
pub mod shutdown;

/// Raw → long → wide reshaping
pub mod transform;

pub use identifier::CoverageKey;

/// Kind of entity tracked by the remote API.
///
/// Doubles as the output "level" used in paths and tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Country-level entity (ISO2 code)
    Country,
    /// Sub-national region
    Region,
}

impl EntityType {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Country => "country",
            EntityType::Region => "region",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "country" => Ok(EntityType::Country),
            "region" => Ok(EntityType::Region),
            _ => Err(format!("Invalid entity type: {s}")),
        }
    }
}

/// Which levels a fetch run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    /// Countries only
    Country,
    /// Regions only
    Region,
    /// Countries and regions
    #[default]
    Both,
}

impl LevelFilter {
    /// Whether `entity_type` passes this filter
    pub fn matches(&self, entity_type: EntityType) -> bool {
        match self {
            LevelFilter::Both => true,
            LevelFilter::Country => entity_type == EntityType::Country,
            LevelFilter::Region => entity_type == EntityType::Region,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "country" => Ok(LevelFilter::Country),
            "region" => Ok(LevelFilter::Region),
            "both" => Ok(LevelFilter::Both),
            _ => Err(format!(
                "Invalid level: {s}. Valid options: country, region, both"
            )),
        }
    }
}

impl std::fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LevelFilter::Country => "country",
            LevelFilter::Region => "region",
            LevelFilter::Both => "both",
        };
        f.write_str(s)
    }
}

/// Chunk granularity, coarsest to finest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Calendar month
    Month,
    /// Seven days
    Week,
    /// One day
    Day,
}

impl Granularity {
    /// Next finer granularity, `None` at the bottom of the ladder
    pub fn finer(&self) -> Option<Granularity> {
        match self {
            Granularity::Month => Some(Granularity::Week),
            Granularity::Week => Some(Granularity::Day),
            Granularity::Day => None,
        }
    }

    /// Advance `from` by one step of this granularity.
    ///
    /// Months are calendar months anchored on `from`, with the day clamped to the
    /// target month's length (Jan 31 → Feb 28).
    pub fn step(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Month => from
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Granularity::Week => from + Duration::days(7),
            Granularity::Day => from + Duration::days(1),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Granularity::Month => "month",
            Granularity::Week => "week",
            Granularity::Day => "day",
        };
        f.write_str(s)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" => Ok(Granularity::Month),
            "week" => Ok(Granularity::Week),
            "day" => Ok(Granularity::Day),
            _ => Err(format!(
                "Unsupported chunk mode: {s}. Valid options: month, week, day"
            )),
        }
    }
}

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window from its bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Create a window from epoch seconds
    pub fn from_epoch(start: i64, end: i64) -> Option<Self> {
        let start = Utc.timestamp_opt(start, 0).single()?;
        let end = Utc.timestamp_opt(end, 0).single()?;
        Some(Self { start, end })
    }

    /// Start as epoch seconds
    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    /// End as epoch seconds
    pub fn end_epoch(&self) -> i64 {
        self.end.timestamp()
    }

    /// `true` when the window contains no instant
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// File stem used for raw chunk files: `{start}_{end}`
    pub fn filename_stem(&self) -> String {
        format!("{}_{}", self.start_epoch(), self.end_epoch())
    }

    /// Split into consecutive sub-windows of `granularity`.
    ///
    /// The last sub-window is clamped to `end`. An empty window yields nothing.
    pub fn split(&self, granularity: Granularity) -> Vec<TimeWindow> {
        let mut chunks = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = granularity.step(cursor).min(self.end);
            chunks.push(TimeWindow::new(cursor, next));
            cursor = next;
        }
        chunks
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Country or region as resolved during discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind
    pub entity_type: EntityType,
    /// Stable remote code (ISO2 for countries)
    pub code: String,
    /// Display name
    pub name: Option<String>,
    /// ISO2 code, countries only
    pub iso2: Option<String>,
    /// Parent country code, regions only
    pub parent_country_id: Option<String>,
    /// Parent country name, regions only
    pub parent_country_name: Option<String>,
    /// Raw attribute map from the API
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
    /// Name given in the pipeline config, countries only
    pub config_name: Option<String>,
}

/// A datasource (metric) advertised by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasource {
    /// Datasource identifier, e.g. `ping-slash24`
    pub datasource: String,
    /// Display name
    pub name: Option<String>,
    /// Physical units
    pub units: Option<String>,
}

/// Format a UTC instant as `YYYY-MM-DDTHH:MM:SSZ`
pub fn isoformat_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Format epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`
pub fn epoch_to_utc_string(ts: i64) -> Option<String> {
    Utc.timestamp_opt(ts, 0).single().map(isoformat_utc)
}
