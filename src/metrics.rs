//! Observability metrics for the pipeline
//!
//! Counters and histograms for API traffic, retries, coverage probes and raw
//! chunk writes. Recording is always safe: without an installed recorder the
//! `metrics` macros are no-ops.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter, enabled with `--metrics-addr`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "ioda_http_requests_total",
        Unit::Count,
        "HTTP request attempts made to the IODA API"
    );
    describe_counter!(
        "ioda_transient_errors_total",
        Unit::Count,
        "Transient failures seen by the HTTP layer"
    );
    describe_counter!(
        "ioda_http_retries_total",
        Unit::Count,
        "Retry attempts after a transient failure"
    );
    describe_histogram!(
        "ioda_retry_backoff_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_counter!(
        "ioda_coverage_probe_requests_total",
        Unit::Count,
        "Signal queries issued by the coverage prober"
    );
    describe_counter!(
        "ioda_coverage_results_total",
        Unit::Count,
        "Coverage probes completed, by status"
    );
    describe_counter!(
        "ioda_chunks_total",
        Unit::Count,
        "Raw chunks handled by the fetcher, by outcome"
    );
    describe_histogram!(
        "ioda_chunk_bytes",
        Unit::Bytes,
        "Size of raw chunk bodies written"
    );
    describe_counter!(
        "ioda_targets_failed_total",
        Unit::Count,
        "Fetch targets that ended in an error"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Count one request attempt against `endpoint`
pub fn record_http_request(endpoint: &str) {
    counter!("ioda_http_requests_total", "endpoint" => endpoint_label(endpoint)).increment(1);
}

/// Count a transient failure of the given kind
pub fn record_transient_error(kind: &str) {
    counter!("ioda_transient_errors_total", "kind" => kind.to_string()).increment(1);
}

/// Record a retry and the backoff slept before it
pub fn record_retry(backoff: Duration) {
    counter!("ioda_http_retries_total").increment(1);
    histogram!("ioda_retry_backoff_seconds").record(backoff.as_secs_f64());
    debug!(backoff_ms = backoff.as_millis() as u64, "Retry backoff recorded");
}

/// Count one prober query
pub fn record_probe_request() {
    counter!("ioda_coverage_probe_requests_total").increment(1);
}

/// Count one finished probe by status
pub fn record_probe_result(status: &str) {
    counter!("ioda_coverage_results_total", "status" => status.to_string()).increment(1);
}

/// Outcome of one chunk on the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Body written to disk
    Written,
    /// File already present
    SkippedExisting,
    /// Planned only
    DryRun,
    /// Split into finer sub-windows
    Split,
    /// Failed at the finest granularity or with an API error
    Failed,
}

impl ChunkOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ChunkOutcome::Written => "written",
            ChunkOutcome::SkippedExisting => "skipped_existing",
            ChunkOutcome::DryRun => "dry_run",
            ChunkOutcome::Split => "split",
            ChunkOutcome::Failed => "failed",
        }
    }
}

/// Count one chunk outcome
pub fn record_chunk(outcome: ChunkOutcome, granularity: &str) {
    counter!(
        "ioda_chunks_total",
        "outcome" => outcome.as_str(),
        "granularity" => granularity.to_string(),
    )
    .increment(1);
}

/// Record the size of a written body
pub fn record_chunk_bytes(bytes: usize) {
    histogram!("ioda_chunk_bytes").record(bytes as f64);
}

/// Timing and outcome of one fetch target
pub struct TargetMetrics {
    level: String,
    metric: String,
    start_time: Instant,
}

impl TargetMetrics {
    /// Start tracking a target
    pub fn start(level: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            metric: metric.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a target that finished without error
    pub fn record_success(&self, written: u64) {
        debug!(
            level = %self.level,
            metric = %self.metric,
            written,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Target completed"
        );
    }

    /// Record a failed target
    pub fn record_failure(&self, error: &str) {
        counter!(
            "ioda_targets_failed_total",
            "level" => self.level.clone(),
            "metric" => self.metric.clone(),
        )
        .increment(1);

        error!(
            level = %self.level,
            metric = %self.metric,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Target failed"
        );
    }
}

/// Collapse per-entity signal paths so label cardinality stays bounded
fn endpoint_label(endpoint: &str) -> String {
    let trimmed = endpoint.trim_matches('/');
    match trimmed.split('/').collect::<Vec<_>>().as_slice() {
        ["signals", "raw", level, ..] => format!("/signals/raw/{level}"),
        _ => format!("/{trimmed}"),
    }
}
