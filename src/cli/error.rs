//! CLI error types and conversions

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::coverage::CoverageError;
use crate::downloader::{DownloadError, FetchSummary};
use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::qa::QaError;
use crate::transform::TransformError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration file error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Discovery or catalog error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Coverage probing error
    #[error("coverage error: {0}")]
    Coverage(#[from] CoverageError),

    /// Fetch error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Fetch run stopped at a target; carries the counters so far
    #[error("fetch aborted at {target}: {source} ({summary})")]
    FetchAborted {
        /// Target that failed
        target: String,
        /// Counters at the time of the abort
        summary: FetchSummary,
        /// Underlying failure
        source: DownloadError,
    },

    /// HTTP client error
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Build-panel error
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// QA error
    #[error("qa error: {0}")]
    Qa(#[from] QaError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
