//! Pipeline configuration
//!
//! Loaded from a TOML file with serde defaults for every field. When the file
//! does not exist the West Africa scope compiled into the binary is used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::downloader::config::{
    DEFAULT_MAX_POINTS, DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_USER_AGENT, MAX_RETRIES,
    MIN_INTERVAL_MS, REQUEST_TIMEOUT_SECS,
};
use crate::Granularity;

/// Default West Africa scope
const EMBEDDED_CONFIG: &str = include_str!("../config/west_africa.toml");

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML or has the wrong shape
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Country scope
    #[serde(default)]
    pub region_definition: RegionDefinition,
    /// Discovery and coverage probing
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Fetch defaults
    #[serde(default)]
    pub fetch_defaults: FetchDefaults,
}

/// Countries in scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    /// Display name of the scope
    #[serde(default)]
    pub name: Option<String>,
    /// Enables the optional Mauritania entry
    #[serde(default)]
    pub include_mauritania: bool,
    /// Configured countries
    #[serde(default)]
    pub countries: Vec<CountryConfig>,
}

/// One configured country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryConfig {
    /// ISO 3166-1 alpha-2 code
    pub iso2: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the country is requested
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional entries are gated by a scope flag
    #[serde(default)]
    pub optional: bool,
}

/// A country after applying the scope flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedCountry {
    /// Upper-case ISO2 code
    pub iso2: String,
    /// Configured name, or the code
    pub name: String,
    /// Effective enabled flag
    pub enabled: bool,
    /// Optional flag as configured
    pub optional: bool,
}

/// `[discovery]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Coverage cache location
    #[serde(default = "default_cache_path")]
    pub coverage_cache_path: PathBuf,
    /// Length of the recency probe window in days
    #[serde(default = "default_recent_days")]
    pub recent_days_check: i64,
    /// First year considered by the coverage search
    #[serde(default = "default_floor_year")]
    pub earliest_search_floor_year: i32,
}

/// `[fetch_defaults]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchDefaults {
    /// HTTP behaviour
    #[serde(default)]
    pub request: RequestSettings,
    /// Chunk ladder
    #[serde(default)]
    pub chunking: ChunkingSettings,
    /// Default fetch window
    #[serde(default)]
    pub window: WindowSettings,
}

/// `[fetch_defaults.request]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSettings {
    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Minimum spacing between requests
    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: f64,
    /// Attempts per request, first try included
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// `[fetch_defaults.chunking]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingSettings {
    /// Granularity the ladder starts at
    #[serde(default = "default_initial")]
    pub initial: Granularity,
    /// Point budget per chunk request
    #[serde(default = "default_max_points")]
    pub max_points: u32,
    /// Body size above which a chunk is split
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

/// `[fetch_defaults.window]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Start used when none is given on the command line
    #[serde(default)]
    pub default_start: Option<String>,
    /// End used when none is given on the command line
    #[serde(default)]
    pub default_end: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("data/intermediate/coverage_cache.json")
}
fn default_recent_days() -> i64 {
    30
}
fn default_floor_year() -> i32 {
    2000
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_timeout_seconds() -> f64 {
    REQUEST_TIMEOUT_SECS as f64
}
fn default_min_interval_seconds() -> f64 {
    MIN_INTERVAL_MS as f64 / 1000.0
}
fn default_max_retries() -> u32 {
    MAX_RETRIES
}
fn default_initial() -> Granularity {
    Granularity::Month
}
fn default_max_points() -> u32 {
    DEFAULT_MAX_POINTS
}
fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            coverage_cache_path: default_cache_path(),
            recent_days_check: default_recent_days(),
            earliest_search_floor_year: default_floor_year(),
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
            min_interval_seconds: default_min_interval_seconds(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            max_points: default_max_points(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl WindowSettings {
    /// Configured start, blank treated as unset
    pub fn start(&self) -> Option<&str> {
        non_blank(self.default_start.as_deref())
    }

    /// Configured end, blank treated as unset
    pub fn end(&self) -> Option<&str> {
        non_blank(self.default_end.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

impl PipelineConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] when
    /// values fail validation
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The West Africa scope compiled into the binary
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(EMBEDDED_CONFIG)
    }

    /// Load `path`, falling back to the embedded scope when it does not exist
    ///
    /// # Errors
    /// Read, parse or validation failures of an existing file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using embedded West Africa scope");
            return Self::embedded();
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            countries = config.region_definition.countries.len(),
            "Loaded config"
        );
        Ok(config)
    }

    /// Countries with the scope flags applied, in configured order
    ///
    /// Codes are upper-cased; blank codes are dropped; an optional `MR` entry is
    /// enabled exactly when `include_mauritania` is set.
    pub fn requested_countries(&self) -> Vec<RequestedCountry> {
        let region = &self.region_definition;
        region
            .countries
            .iter()
            .filter_map(|item| {
                let iso2 = item.iso2.trim().to_uppercase();
                if iso2.is_empty() {
                    return None;
                }
                let enabled = if iso2 == "MR" && item.optional {
                    region.include_mauritania
                } else {
                    item.enabled
                };
                Some(RequestedCountry {
                    name: item
                        .name
                        .clone()
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| iso2.clone()),
                    iso2,
                    enabled,
                    optional: item.optional,
                })
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.recent_days_check <= 0 {
            return Err(ConfigError::Invalid(
                "discovery.recent_days_check must be > 0".to_string(),
            ));
        }
        let request = &self.fetch_defaults.request;
        if request.timeout_seconds.is_nan() || request.timeout_seconds <= 0.0 {
            return Err(ConfigError::Invalid(
                "fetch_defaults.request.timeout_seconds must be > 0".to_string(),
            ));
        }
        if request.min_interval_seconds < 0.0 || !request.min_interval_seconds.is_finite() {
            return Err(ConfigError::Invalid(
                "fetch_defaults.request.min_interval_seconds must be >= 0".to_string(),
            ));
        }
        let chunking = &self.fetch_defaults.chunking;
        if chunking.max_points == 0 || chunking.max_response_bytes == 0 {
            return Err(ConfigError::Invalid(
                "fetch_defaults.chunking limits must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
