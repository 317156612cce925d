//! CLI command implementations
//!
//! One subcommand per pipeline stage plus the monthly closeout composite.
//! HTTP settings are global so every network stage shares them; values given
//! on the command line override `[fetch_defaults.request]`.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;

pub mod build;
pub mod closeout;
pub mod discover;
pub mod error;
pub mod fetch;
pub mod qa;

pub use build::BuildPanelArgs;
pub use closeout::CloseoutArgs;
pub use discover::DiscoverArgs;
pub use error::CliError;
pub use fetch::FetchArgs;
pub use qa::QaArgs;

use crate::config::PipelineConfig;
use crate::downloader::config::DEFAULT_BASE_URL;
use crate::fetcher::ioda_http::IodaHttpClient;
use crate::fetcher::request_log::RequestLog;

/// IODA pipeline CLI
#[derive(Parser, Debug)]
#[command(name = "ioda-pipeline")]
#[command(about = "Discover, fetch and normalise IODA signals for a regional scope", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Pipeline config (TOML); the embedded West Africa scope is used when absent
    #[arg(long, global = true, default_value = "config/west_africa.toml")]
    pub config: PathBuf,

    /// Attempts per request for transient failures (range: 1-20)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,

    /// Minimum delay between requests, in seconds
    #[arg(long, global = true)]
    pub min_interval_seconds: Option<f64>,

    /// HTTP timeout, in seconds
    #[arg(long, global = true)]
    pub timeout_seconds: Option<f64>,

    /// HTTP User-Agent header
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// NDJSON log of every request attempt
    #[arg(long, global = true, default_value = "data/logs/requests.ndjson")]
    pub request_log: PathBuf,

    /// IODA API root
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve entities and datasources, probe coverage, write the catalog
    Discover(DiscoverArgs),

    /// Fetch raw signal chunks for catalog targets
    Fetch(FetchArgs),

    /// Build the long table and wide panels from the raw archive
    BuildPanel(BuildPanelArgs),

    /// Summarise the long table
    Qa(QaArgs),

    /// Fetch one closed calendar month, then rebuild panels and QA
    Closeout(CloseoutArgs),
}

impl Cli {
    /// Load the config and apply command-line request overrides
    ///
    /// # Errors
    /// Config read/parse failures, or overrides that fail validation
    pub fn load_config(&self) -> Result<PipelineConfig, CliError> {
        let mut config = PipelineConfig::load(&self.config)?;
        let request = &mut config.fetch_defaults.request;
        if let Some(max_retries) = self.max_retries {
            request.max_retries = max_retries;
        }
        if let Some(interval) = self.min_interval_seconds {
            if !interval.is_finite() || interval < 0.0 {
                return Err(CliError::InvalidArgument(format!(
                    "--min-interval-seconds must be >= 0, got {interval}"
                )));
            }
            request.min_interval_seconds = interval;
        }
        if let Some(timeout) = self.timeout_seconds {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(CliError::InvalidArgument(format!(
                    "--timeout-seconds must be > 0, got {timeout}"
                )));
            }
            request.timeout_seconds = timeout;
        }
        if let Some(agent) = &self.user_agent {
            request.user_agent = agent.clone();
        }
        Ok(config)
    }

    /// HTTP client for `config`, logging to `--request-log`
    pub fn build_client(&self, config: &PipelineConfig) -> Result<IodaHttpClient, CliError> {
        Ok(IodaHttpClient::new(&config.fetch_defaults.request)?
            .with_base_url(self.base_url.as_str())
            .with_request_log(RequestLog::new(&self.request_log)))
    }
}

/// Progress bar in the house style
pub fn create_progress_bar(len: u64, message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(message.into());
    pb
}
