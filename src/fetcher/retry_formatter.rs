//! Error classification and retry log messages for the IODA HTTP client.
//!
//! Decides which failures are transient (retried, then surfaced as
//! [`FetcherError::Transient`](super::FetcherError::Transient)) and which are
//! API errors, and renders the attempt/backoff lines the client logs.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Status codes that are retried and surfaced as transient.
pub const TRANSIENT_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Classification of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 500/502/503/504
    ServerError(u16),
    /// Body was not valid JSON
    MalformedBody,
    /// Any other 4xx/5xx status, never retried
    Rejected(u16),
    /// Generic transport failure
    NetworkGeneric,
}

impl RetryErrorType {
    /// Short description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::MalformedBody => "invalid JSON body",
            Self::Rejected(code) => match code {
                400 => "invalid request",
                404 => "resource not found",
                _ => "request rejected",
            },
            Self::NetworkGeneric => "network error",
        }
    }

    /// Whether the failure is retried and reported as transient.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RetryErrorType::Rejected(_))
    }
}

/// Classify an HTTP status. `None` means the status is not a failure.
pub fn classify_status(status: StatusCode) -> Option<RetryErrorType> {
    let code = status.as_u16();
    if code == 429 {
        return Some(RetryErrorType::RateLimit);
    }
    if TRANSIENT_STATUS_CODES.contains(&code) {
        return Some(RetryErrorType::ServerError(code));
    }
    if code >= 400 {
        return Some(RetryErrorType::Rejected(code));
    }
    None
}

/// Classify a transport-level reqwest error.
pub fn classify_transport_error(err: &ReqwestError) -> RetryErrorType {
    if err.is_timeout() {
        return RetryErrorType::NetworkTimeout;
    }
    if err.is_connect() {
        return RetryErrorType::NetworkOffline;
    }
    RetryErrorType::NetworkGeneric
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Endpoint path that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Format the line logged before sleeping for the next attempt.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.endpoint,
            self.attempt + 1,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        )
    }

    /// Format the final failure once attempts are exhausted.
    pub fn format_failure(&self, last_error: &str) -> String {
        format!(
            "{} failed after {} attempts ({}): {}",
            self.endpoint,
            self.max_attempts,
            self.error_type.description(),
            last_error
        )
    }
}
