//! Chunked fetch orchestration and rate limiting
//!
//! # Overview
//!
//! 1. **Target selection**: catalog rows become [`job::FetchTarget`]s
//! 2. **Window resolution**: explicit bounds, coverage and the previous run
//!    decide what to fetch ([`window::resolve_window`])
//! 3. **Execution**: [`executor::ChunkFetcher`] walks the month → week → day
//!    ladder and writes one raw file per window
//! 4. **Rate limiting**: [`rate_limit::RateLimiter`], owned by the HTTP client
//!
//! # Quick Start
//!
//! ```no_run
//! use ioda_pipeline::downloader::{ChunkFetcher, ChunkOptions, FetchSummary, FetchTarget};
//! use ioda_pipeline::fetcher::ioda_http::IodaHttpClient;
//! use ioda_pipeline::config::RequestSettings;
//! use ioda_pipeline::{EntityType, Granularity, TimeWindow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = IodaHttpClient::new(&RequestSettings::default())?;
//! let options = ChunkOptions { dry_run: true, ..Default::default() };
//! let fetcher = ChunkFetcher::new(&client, "data/raw", options);
//!
//! let target = FetchTarget::new(EntityType::Country, "GH", "bgp");
//! let window = TimeWindow::from_epoch(1771545600, 1771718400).unwrap();
//! let mut summary = FetchSummary::default();
//! for plan in fetcher.fetch_target(&target, window, Granularity::Day, &mut summary).await? {
//!     println!("PLAN {} {}", target.label(), plan);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All operations return `Result<T, DownloadError>`:
//! - Transient and oversize chunks are split, not surfaced, until day granularity
//! - API errors abort the target
//! - Write failures abort the target
//! - Bad dates and month labels are validation errors

pub mod config;
pub mod executor;
pub mod job;
pub mod rate_limit;
pub mod window;

pub use executor::{ChunkFetcher, ChunkOptions, PlannedChunk};
pub use job::{parse_metrics_arg, select_targets, FetchSummary, FetchTarget};
pub use rate_limit::RateLimiter;
pub use window::{parse_end_flexible, parse_start_flexible, resolve_window};

use crate::fetcher::FetcherError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Error from the API layer, including oversize chunks at day granularity
    #[error(transparent)]
    Fetcher(#[from] FetcherError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Validation error
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Output error
    #[error("output error: {0}")]
    OutputError(String),

    /// Stopped by Ctrl+C
    #[error("Shutdown requested")]
    Interrupted,
}

impl DownloadError {
    /// Whether the underlying failure was transient
    pub fn is_transient(&self) -> bool {
        matches!(self, DownloadError::Fetcher(e) if e.is_transient())
    }
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;
