//! IODA HTTP client
//!
//! Provides the production [`IodaApi`] implementation with:
//! - Minimum-interval pacing through an owned [`RateLimiter`]
//! - Retry with exponential backoff and jitter for transient failures
//! - Transient vs API error classification
//! - One NDJSON request-log record per attempt

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RequestSettings;
use crate::downloader::config::{BackoffPolicy, DEFAULT_BASE_URL};
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::request_log::{RequestLog, RequestRecord};
use crate::fetcher::retry_formatter::{
    classify_status, classify_transport_error, RetryContext, RetryErrorType,
};
use crate::fetcher::{
    json_type_name, FetcherError, FetcherResult, IodaApi, RawResponse, SignalsQuery,
};

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How much of a rejected body is echoed into the error message
const ERROR_BODY_PREVIEW: usize = 500;

/// Failure of a single attempt
#[derive(Debug)]
enum AttemptError {
    Transient {
        kind: RetryErrorType,
        message: String,
        status: Option<u16>,
        bytes: Option<usize>,
    },
    Api {
        message: String,
        status: Option<u16>,
        bytes: Option<usize>,
    },
}

impl AttemptError {
    fn message(&self) -> &str {
        match self {
            AttemptError::Transient { message, .. } | AttemptError::Api { message, .. } => message,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            AttemptError::Transient { status, .. } | AttemptError::Api { status, .. } => *status,
        }
    }

    fn bytes(&self) -> Option<usize> {
        match self {
            AttemptError::Transient { bytes, .. } | AttemptError::Api { bytes, .. } => *bytes,
        }
    }
}

/// Client for the IODA v2 REST API
pub struct IodaHttpClient {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    max_attempts: u32,
    backoff: BackoffPolicy,
    request_log: Option<RequestLog>,
}

impl IodaHttpClient {
    /// Create a client from request settings
    ///
    /// # Errors
    /// Returns [`FetcherError::Setup`] if the underlying reqwest client cannot be built
    pub fn new(settings: &RequestSettings) -> FetcherResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let agent = HeaderValue::from_str(&settings.user_agent)
            .map_err(|e| FetcherError::Setup(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs_f64(settings.timeout_seconds.max(0.001)))
            .build()
            .map_err(|e| FetcherError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limiter: RateLimiter::min_interval(Duration::from_secs_f64(
                settings.min_interval_seconds.max(0.0),
            )),
            max_attempts: settings.max_retries.max(1),
            backoff: BackoffPolicy::default(),
            request_log: None,
        })
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Append one record per attempt to `log`
    pub fn with_request_log(mut self, log: RequestLog) -> Self {
        self.request_log = Some(log);
        self
    }

    /// Replace the retry backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// API root in use
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attempts per request, first try included
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute a GET with retries and return the decoded JSON object
    ///
    /// # Arguments
    /// * `endpoint` - Path below the API root (e.g. "/datasources/")
    /// * `params` - Query parameters
    ///
    /// # Errors
    /// [`FetcherError::Transient`] once attempts are exhausted on a transient
    /// failure, [`FetcherError::Api`] immediately on anything else
    pub async fn get_json(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> FetcherResult<RawResponse> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));

        for attempt in 1..=self.max_attempts {
            self.rate_limiter.acquire().await;
            crate::metrics::record_http_request(endpoint);
            let started = Instant::now();
            let outcome = self.one_request(&url, params).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            let mut record = RequestRecord::new("GET", &url, params, attempt);
            record.duration_ms = (duration_ms * 1000.0).round() / 1000.0;

            match outcome {
                Ok(mut response) => {
                    record.status = Some(response.status);
                    record.bytes = Some(response.size_bytes());
                    self.log(&record);
                    response.elapsed_ms = duration_ms;
                    debug!(
                        url = %url,
                        attempt,
                        bytes = response.size_bytes(),
                        duration_ms = duration_ms as u64,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    record.status = err.status();
                    record.bytes = err.bytes();
                    record.error = Some(err.message().to_string());
                    self.log(&record);

                    match err {
                        AttemptError::Api { message, .. } => {
                            warn!(url = %url, attempt, error = %message, "Request rejected");
                            return Err(FetcherError::Api(message));
                        }
                        AttemptError::Transient { kind, message, .. } => {
                            let backoff = self.backoff.delay(attempt - 1);
                            let ctx = RetryContext {
                                attempt,
                                max_attempts: self.max_attempts,
                                error_type: kind,
                                backoff_duration: backoff,
                                endpoint: endpoint.to_string(),
                            };
                            crate::metrics::record_transient_error(kind.description());
                            if attempt >= self.max_attempts {
                                warn!("{}", ctx.format_failure(&message));
                                return Err(FetcherError::Transient(message));
                            }
                            warn!("{}", ctx.format_retry());
                            crate::metrics::record_retry(backoff);
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
        }

        Err(FetcherError::Transient(format!(
            "request failed without response after {} attempts: {url}",
            self.max_attempts
        )))
    }

    async fn one_request(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, AttemptError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| AttemptError::Transient {
                kind: classify_transport_error(&e),
                message: format!("Transport error for {url}: {e}"),
                status: None,
                bytes: None,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.bytes().await.map_err(|e| AttemptError::Transient {
            kind: classify_transport_error(&e),
            message: format!("Failed reading body from {final_url}: {e}"),
            status: Some(status.as_u16()),
            bytes: None,
        })?;
        let size = body.len();

        if let Some(kind) = classify_status(status) {
            if kind.is_transient() {
                return Err(AttemptError::Transient {
                    kind,
                    message: format!("HTTP {} for {final_url}", status.as_u16()),
                    status: Some(status.as_u16()),
                    bytes: Some(size),
                });
            }
            let preview: String = String::from_utf8_lossy(&body)
                .chars()
                .take(ERROR_BODY_PREVIEW)
                .collect();
            return Err(AttemptError::Api {
                message: format!("HTTP {} for {final_url}: {preview}", status.as_u16()),
                status: Some(status.as_u16()),
                bytes: Some(size),
            });
        }

        let json: Value = serde_json::from_slice(&body).map_err(|e| AttemptError::Transient {
            kind: RetryErrorType::MalformedBody,
            message: format!("Invalid JSON from {final_url}: {e}"),
            status: Some(status.as_u16()),
            bytes: Some(size),
        })?;

        check_payload(&json).map_err(|message| AttemptError::Api {
            message: format!("{message} from {final_url}"),
            status: Some(status.as_u16()),
            bytes: Some(size),
        })?;

        Ok(RawResponse {
            url: final_url,
            status: status.as_u16(),
            body: body.to_vec(),
            json,
            elapsed_ms: 0.0,
        })
    }

    fn log(&self, record: &RequestRecord) {
        if let Some(log) = &self.request_log {
            log.append(record);
        }
    }
}

/// Reject well-formed payloads that are not objects or that flag an error.
pub fn check_payload(json: &Value) -> Result<(), String> {
    let Some(object) = json.as_object() else {
        return Err(format!("Unexpected JSON root type {}", json_type_name(json)));
    };
    if let Some(error) = object.get("error") {
        if is_truthy(error) {
            return Err(format!("IODA API error {error}"));
        }
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[async_trait]
impl IodaApi for IodaHttpClient {
    async fn query_entities(
        &self,
        entity_type: &str,
        related_to: Option<&str>,
        limit: usize,
        page: usize,
    ) -> FetcherResult<Value> {
        let mut params = vec![("entityType", entity_type.to_string())];
        if let Some(related) = related_to {
            params.push(("relatedTo", related.to_string()));
        }
        params.push(("limit", limit.to_string()));
        params.push(("page", page.to_string()));
        Ok(self.get_json("/entities/query", &params).await?.json)
    }

    async fn datasources(&self) -> FetcherResult<Value> {
        Ok(self.get_json("/datasources/", &[]).await?.json)
    }

    async fn signals_raw(&self, query: &SignalsQuery) -> FetcherResult<RawResponse> {
        let endpoint = format!("/signals/raw/{}/{}", query.entity_type, query.entity_code);
        self.get_json(&endpoint, &query.params()).await
    }
}
