//! Adaptive chunked fetcher
//!
//! Every window of a target is fetched into its own raw file. A chunk that
//! fails transiently or comes back larger than the byte ceiling is split into
//! the next finer granularity (month → week → day) and each sub-window is tried
//! on its own. The descent is driven by an explicit LIFO work stack; sub-windows
//! are pushed in reverse so they are visited chronologically.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::config::{DEFAULT_MAX_POINTS, DEFAULT_MAX_RESPONSE_BYTES};
use super::job::{FetchSummary, FetchTarget};
use super::{DownloadError, DownloadResult};
use crate::fetcher::{FetcherError, IodaApi, SignalsQuery};
use crate::metrics::{record_chunk, record_chunk_bytes, ChunkOutcome, TargetMetrics};
use crate::output::{write_atomic, RawPathBuilder};
use crate::shutdown::SharedShutdown;
use crate::{Granularity, TimeWindow};

/// Per-run knobs for the chunk ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// `maxPoints` sent with every signals query
    pub max_points: u32,
    /// Bodies larger than this are split further
    pub max_response_bytes: usize,
    /// Plan only, no requests
    pub dry_run: bool,
    /// Re-fetch chunks that already exist on disk
    pub overwrite: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            dry_run: false,
            overwrite: false,
        }
    }
}

/// A chunk visited in dry-run mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    /// Window the chunk covers
    pub window: TimeWindow,
    /// Granularity it was planned at
    pub granularity: Granularity,
    /// File it would be written to
    pub path: PathBuf,
}

impl std::fmt::Display for PlannedChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            self.window.start.to_rfc3339(),
            self.window.end.to_rfc3339(),
            self.granularity
        )
    }
}

/// Fetches raw chunks for targets through an [`IodaApi`]
pub struct ChunkFetcher<'a, A: IodaApi + ?Sized> {
    api: &'a A,
    raw_dir: PathBuf,
    options: ChunkOptions,
    shutdown: Option<SharedShutdown>,
}

impl<'a, A: IodaApi + ?Sized> ChunkFetcher<'a, A> {
    /// Create a fetcher writing below `raw_dir`
    pub fn new(api: &'a A, raw_dir: impl Into<PathBuf>, options: ChunkOptions) -> Self {
        Self {
            api,
            raw_dir: raw_dir.into(),
            options,
            shutdown: None,
        }
    }

    /// Stop before the next chunk once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Fetch `window` for `target`, starting at `granularity`.
    ///
    /// The window is first split at `granularity`; each chunk then descends the
    /// ladder as needed. Counters in `summary` are updated as chunks are visited,
    /// including when an error is returned.
    ///
    /// # Returns
    /// Chunks planned in dry-run mode (empty otherwise)
    ///
    /// # Errors
    /// A shutdown request or an API error aborts the target immediately. A chunk still failing at day
    /// granularity is counted, the remaining chunks are processed, and the
    /// first such failure is returned once the work stack is empty.
    pub async fn fetch_target(
        &self,
        target: &FetchTarget,
        window: TimeWindow,
        granularity: Granularity,
        summary: &mut FetchSummary,
    ) -> DownloadResult<Vec<PlannedChunk>> {
        let span = tracing::info_span!(
            "fetch_target",
            target = %target.label(),
            start = %window.start,
            end = %window.end,
            granularity = %granularity
        );
        let _enter = span.enter();

        let target_metrics = TargetMetrics::start(target.level().as_str(), &target.metric);
        let written_before = summary.written_chunks;
        let paths = RawPathBuilder::new(
            &self.raw_dir,
            target.level(),
            &target.metric,
            &target.entity_id,
        );

        let mut stack: Vec<(TimeWindow, Granularity)> = window
            .split(granularity)
            .into_iter()
            .rev()
            .map(|chunk| (chunk, granularity))
            .collect();
        let mut planned = Vec::new();
        let mut deferred: Option<FetcherError> = None;

        while let Some((chunk, level)) = stack.pop() {
            if self.shutdown_requested() {
                info!(remaining = stack.len() + 1, "Shutdown requested, stopping target");
                return Err(DownloadError::Interrupted);
            }
            let path = paths.chunk(&chunk);
            summary.planned_chunks += 1;

            if self.options.dry_run {
                summary.dry_run_chunks += 1;
                record_chunk(ChunkOutcome::DryRun, &level.to_string());
                planned.push(PlannedChunk {
                    window: chunk,
                    granularity: level,
                    path,
                });
                continue;
            }

            if path.exists() && !self.options.overwrite {
                debug!(path = %path.display(), "Chunk exists, skipping");
                summary.skipped_existing += 1;
                record_chunk(ChunkOutcome::SkippedExisting, &level.to_string());
                continue;
            }

            let err = match self.fetch_chunk(target, &chunk).await {
                Ok(body) => {
                    write_atomic(&path, &body)
                        .map_err(|e| DownloadError::OutputError(e.to_string()))?;
                    summary.written_chunks += 1;
                    record_chunk(ChunkOutcome::Written, &level.to_string());
                    record_chunk_bytes(body.len());
                    debug!(path = %path.display(), bytes = body.len(), "Chunk written");
                    continue;
                }
                Err(err) => err,
            };

            if !err.is_recoverable() {
                summary.errors += 1;
                record_chunk(ChunkOutcome::Failed, &level.to_string());
                target_metrics.record_failure(&err.to_string());
                return Err(err.into());
            }

            match level.finer() {
                Some(finer) => {
                    info!(
                        window = %chunk,
                        from = %level,
                        to = %finer,
                        error = %err,
                        "Splitting chunk"
                    );
                    record_chunk(ChunkOutcome::Split, &level.to_string());
                    for sub in chunk.split(finer).into_iter().rev() {
                        stack.push((sub, finer));
                    }
                }
                None => {
                    warn!(window = %chunk, error = %err, "Chunk failed at finest granularity");
                    summary.errors += 1;
                    record_chunk(ChunkOutcome::Failed, &level.to_string());
                    deferred.get_or_insert(err);
                }
            }
        }

        if let Some(err) = deferred {
            target_metrics.record_failure(&err.to_string());
            return Err(err.into());
        }
        target_metrics.record_success(summary.written_chunks - written_before);
        Ok(planned)
    }

    async fn fetch_chunk(
        &self,
        target: &FetchTarget,
        window: &TimeWindow,
    ) -> Result<Vec<u8>, FetcherError> {
        let query = SignalsQuery {
            entity_type: target.entity_type.as_str().to_string(),
            entity_code: target.entity_id.clone(),
            from: window.start_epoch(),
            until: window.end_epoch(),
            datasource: Some(target.metric.clone()),
            max_points: Some(self.options.max_points),
        };
        let response = self.api.signals_raw(&query).await?;
        let size = response.size_bytes();
        if size > self.options.max_response_bytes {
            return Err(FetcherError::ChunkTooLarge {
                size,
                max: self.options.max_response_bytes,
                context: format!("{} {}", target.label(), window.filename_stem()),
            });
        }
        Ok(response.body)
    }
}
