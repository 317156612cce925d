//! Fetch configuration constants

use rand::Rng;
use std::time::Duration;

/// Maximum number of attempts per request (first try included).
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 20_000; // 20 seconds

/// Upper bound of the random jitter added to each backoff, in milliseconds.
pub const BACKOFF_JITTER_MS: u64 = 1000;

/// Minimum spacing between outbound requests, in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 500;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "ioda-west-africa-pipeline/0.1";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.ioda.inetintel.cc.gatech.edu/v2";

/// Point budget for full-resolution chunk requests.
pub const DEFAULT_MAX_POINTS: u32 = 10_000;

/// Body size above which a chunk is split further.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 5_000_000;

/// Look-back used when neither an explicit start nor coverage is known.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Exponential backoff with additive jitter, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial: Duration,
    /// Cap on any single delay
    pub max: Duration,
    /// Upper bound of the uniform jitter
    pub jitter: Duration,
}

impl BackoffPolicy {
    /// No waiting at all, for tests
    pub const fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry_count` (0-based)
    pub fn delay(&self, retry_count: u32) -> Duration {
        let base = self
            .initial
            .saturating_mul(2u32.saturating_pow(retry_count.min(16)));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (base + jitter).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(INITIAL_BACKOFF_MS),
            max: Duration::from_millis(MAX_BACKOFF_MS),
            jitter: Duration::from_millis(BACKOFF_JITTER_MS),
        }
    }
}
