//! Request pacing
//!
//! Enforces a minimum wall-clock interval between consecutive outbound requests.
//! Each [`RateLimiter`] carries its own state; two clients never share pacing
//! unless they share the limiter.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Minimum-interval rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter that spaces requests at least `min_interval` apart
    ///
    /// # Arguments
    /// * `min_interval` - Minimum time between the start of two requests
    pub fn min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait out the remainder of the interval, then record this request.
    ///
    /// Uses the monotonic clock. The lock is held across the sleep so that
    /// concurrent callers queue up instead of firing together.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if self.min_interval.is_zero() {
            *last = Some(Instant::now());
            return;
        }
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                trace!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Pacing request");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
