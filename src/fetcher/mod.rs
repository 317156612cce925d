//! API access for the IODA REST surface
//!
//! Everything above this layer talks to the API through [`IodaApi`], so probes
//! and fetch runs can be exercised against in-memory stubs.

use async_trait::async_trait;
use serde_json::Value;

pub mod ioda_http;
pub mod pagination;
pub mod request_log;
pub mod retry_formatter;

pub use pagination::{list_datasources, list_entities};

/// Fetcher errors
///
/// Exactly two kinds come out of the HTTP layer: [`FetcherError::Transient`]
/// (already retried, may succeed later or with a smaller window) and
/// [`FetcherError::Api`] (never retried). [`FetcherError::ChunkTooLarge`] is
/// synthesized by the chunk ladder for oversize bodies.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// 429/5xx, transport failure or undecodable body, after retries
    #[error("transient error: {0}")]
    Transient(String),

    /// Non-retriable status or an application error flagged in the body
    #[error("API error: {0}")]
    Api(String),

    /// Response body exceeded the configured ceiling
    #[error("response too large ({size} bytes > {max}) for {context}")]
    ChunkTooLarge {
        /// Body size in bytes
        size: usize,
        /// Configured ceiling
        max: usize,
        /// Target and window description
        context: String,
    },

    /// Payload decoded but did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// HTTP client could not be constructed
    #[error("client setup error: {0}")]
    Setup(String),
}

impl FetcherError {
    /// Transient kind from the HTTP layer
    pub fn is_transient(&self) -> bool {
        matches!(self, FetcherError::Transient(_))
    }

    /// Whether the chunk ladder may retry with a finer granularity
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FetcherError::Transient(_) | FetcherError::ChunkTooLarge { .. }
        )
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One decoded API response
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final request URL
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Raw body bytes, persisted verbatim by the fetcher
    pub body: Vec<u8>,
    /// Decoded JSON object
    pub json: Value,
    /// Wall-clock duration of the successful attempt
    pub elapsed_ms: f64,
}

impl RawResponse {
    /// Build a response from a JSON value, serializing it as the body
    pub fn from_json(url: impl Into<String>, json: Value) -> Self {
        let body = serde_json::to_vec(&json).unwrap_or_default();
        Self {
            url: url.into(),
            status: 200,
            body,
            json,
            elapsed_ms: 0.0,
        }
    }

    /// Body size in bytes
    pub fn size_bytes(&self) -> usize {
        self.body.len()
    }
}

/// Parameters for `/signals/raw/{type}/{code}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalsQuery {
    /// `country` or `region`
    pub entity_type: String,
    /// Entity code
    pub entity_code: String,
    /// Window start, epoch seconds
    pub from: i64,
    /// Window end, epoch seconds
    pub until: i64,
    /// Restrict to one datasource
    pub datasource: Option<String>,
    /// Point budget for the response
    pub max_points: Option<u32>,
}

impl SignalsQuery {
    /// Query parameters in wire order
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("from", self.from.to_string()), ("until", self.until.to_string())];
        if let Some(ds) = &self.datasource {
            params.push(("datasource", ds.clone()));
        }
        if let Some(max_points) = self.max_points {
            params.push(("maxPoints", max_points.to_string()));
        }
        params
    }
}

/// Short name of a JSON value's type, for error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Access to the IODA API
#[async_trait]
pub trait IodaApi: Send + Sync {
    /// One page of `/entities/query`
    ///
    /// # Arguments
    /// * `entity_type` - `country` or `region`
    /// * `related_to` - Optional relation filter, e.g. `country/NG`
    /// * `limit` - Page size
    /// * `page` - Zero-based page index
    async fn query_entities(
        &self,
        entity_type: &str,
        related_to: Option<&str>,
        limit: usize,
        page: usize,
    ) -> FetcherResult<Value>;

    /// `/datasources/`
    async fn datasources(&self) -> FetcherResult<Value>;

    /// `/signals/raw/{type}/{code}`
    async fn signals_raw(&self, query: &SignalsQuery) -> FetcherResult<RawResponse>;
}
