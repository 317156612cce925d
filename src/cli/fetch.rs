//! Fetch command implementation

use chrono::{DateTime, Utc};
use clap::Args;
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info};

use super::{create_progress_bar, Cli, CliError};
use crate::catalog::load_catalog;
use crate::config::PipelineConfig;
use crate::downloader::{
    parse_end_flexible, parse_metrics_arg, parse_start_flexible, resolve_window, select_targets,
    ChunkFetcher, ChunkOptions, FetchSummary, PlannedChunk,
};
use crate::fetcher::IodaApi;
use crate::output::path::{CATALOG_FILE, LONG_TABLE_FILE, QA_SUMMARY_FILE};
use crate::qa::{last_run_lookup, LastRunKey};
use crate::shutdown::SharedShutdown;
use crate::{Granularity, LevelFilter};

/// Fetch raw signal chunks for catalog targets
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Entity catalog written by `discover`
    #[arg(long, default_value = "data/processed/entity_catalog.csv")]
    pub entity_catalog: PathBuf,

    /// Raw archive root
    #[arg(long, default_value = "data/raw")]
    pub raw_dir: PathBuf,

    /// Processed outputs, read for --since-last-run
    #[arg(long, default_value = "data/processed")]
    pub processed_dir: PathBuf,

    /// Entity level: country, region or both
    #[arg(long, default_value = "both")]
    pub level: LevelFilter,

    /// Comma-separated datasources, or `auto` for every catalog metric
    #[arg(long, default_value = "auto")]
    pub metrics: String,

    /// Window start (epoch seconds, RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// Window end (epoch seconds, RFC 3339 or YYYY-MM-DD, inclusive day)
    #[arg(long)]
    pub end: Option<String>,

    /// Print the chunk plan without requesting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep the first N entities of each level
    #[arg(long)]
    pub limit_entities: Option<usize>,

    /// Start after the latest timestamp already in the processed outputs
    #[arg(long)]
    pub since_last_run: bool,

    /// Re-fetch chunks that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// `maxPoints` per signals request
    #[arg(long)]
    pub max_points: Option<u32>,

    /// Split responses larger than this many bytes
    #[arg(long)]
    pub max_response_bytes: Option<usize>,

    /// First rung of the chunk ladder: month, week or day
    #[arg(long)]
    pub initial_chunk_mode: Option<Granularity>,
}

/// Inputs of one fetch run
#[derive(Debug, Clone)]
pub struct FetchRun {
    /// Entity catalog path
    pub catalog_path: PathBuf,
    /// Raw archive root
    pub raw_dir: PathBuf,
    /// Level filter
    pub level: LevelFilter,
    /// Metric subset, `None` for every catalog metric
    pub metrics: Option<Vec<String>>,
    /// Entities kept per level
    pub limit_entities: Option<usize>,
    /// Explicit start
    pub start: Option<DateTime<Utc>>,
    /// Explicit end
    pub end: Option<DateTime<Utc>>,
    /// Last processed timestamps, incremental runs only
    pub last_run: Option<HashMap<LastRunKey, DateTime<Utc>>>,
    /// First rung of the ladder
    pub initial: Granularity,
    /// Ladder options
    pub options: ChunkOptions,
}

/// Outcome of a fetch run
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Run counters
    pub summary: FetchSummary,
    /// Dry-run plan as (target label, chunk)
    pub planned: Vec<(String, PlannedChunk)>,
}

/// Fetch every selected target in catalog order.
///
/// The first failing target stops the run; chunks already written stay on
/// disk and are skipped by the next run.
pub async fn run_fetch<A: IodaApi + ?Sized>(
    api: &A,
    run: &FetchRun,
    now: DateTime<Utc>,
    shutdown: Option<SharedShutdown>,
    progress: Option<&ProgressBar>,
) -> Result<FetchReport, CliError> {
    let catalog = load_catalog(&run.catalog_path)?;
    let targets = select_targets(
        &catalog,
        run.level,
        run.metrics.as_deref(),
        run.limit_entities,
    );
    info!(
        catalog_rows = catalog.len(),
        targets = targets.len(),
        initial = %run.initial,
        dry_run = run.options.dry_run,
        "Starting fetch"
    );
    if let Some(pb) = progress {
        pb.set_length(targets.len() as u64);
    }

    let mut fetcher = ChunkFetcher::new(api, &run.raw_dir, run.options);
    if let Some(shutdown) = shutdown {
        fetcher = fetcher.with_shutdown(shutdown);
    }

    let mut report = FetchReport::default();
    report.summary.targets = targets.len() as u64;
    for target in &targets {
        if let Some(pb) = progress {
            pb.set_message(target.label());
        }

        let previous_max = run.last_run.as_ref().and_then(|lookup| {
            lookup
                .get(&(
                    target.level().as_str().to_string(),
                    target.entity_id.clone(),
                    target.metric.clone(),
                ))
                .copied()
        });
        let Some(window) = resolve_window(target, run.start, run.end, previous_max, now) else {
            info!(target = %target.label(), "Nothing to fetch");
            if let Some(pb) = progress {
                pb.inc(1);
            }
            continue;
        };

        match fetcher
            .fetch_target(target, window, run.initial, &mut report.summary)
            .await
        {
            Ok(planned) => {
                let label = target.label();
                report
                    .planned
                    .extend(planned.into_iter().map(|plan| (label.clone(), plan)));
            }
            Err(e) => {
                error!(target = %target.label(), summary = %report.summary, "Fetch aborted");
                return Err(CliError::FetchAborted {
                    target: target.label(),
                    summary: report.summary,
                    source: e,
                });
            }
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    info!(summary = %report.summary, "Fetch complete");
    Ok(report)
}

/// Ladder options from config, overridden by flags
pub(crate) fn chunk_options(
    config: &PipelineConfig,
    max_points: Option<u32>,
    max_response_bytes: Option<usize>,
    dry_run: bool,
    overwrite: bool,
) -> Result<ChunkOptions, CliError> {
    let chunking = &config.fetch_defaults.chunking;
    let options = ChunkOptions {
        max_points: max_points.unwrap_or(chunking.max_points),
        max_response_bytes: max_response_bytes.unwrap_or(chunking.max_response_bytes),
        dry_run,
        overwrite,
    };
    if options.max_points == 0 {
        return Err(CliError::InvalidArgument("--max-points must be > 0".to_string()));
    }
    if options.max_response_bytes == 0 {
        return Err(CliError::InvalidArgument(
            "--max-response-bytes must be > 0".to_string(),
        ));
    }
    Ok(options)
}

impl FetchArgs {
    fn to_run(&self, config: &PipelineConfig) -> Result<FetchRun, CliError> {
        let window = &config.fetch_defaults.window;
        let start = match self.start.as_deref().or(window.start()) {
            Some(s) => parse_start_flexible(s)?,
            None => None,
        };
        let end = match self.end.as_deref().or(window.end()) {
            Some(s) => parse_end_flexible(s)?,
            None => None,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(CliError::InvalidArgument(format!(
                    "start ({start}) must be before end ({end})"
                )));
            }
        }

        let last_run = self.since_last_run.then(|| {
            last_run_lookup(
                &self.processed_dir.join(QA_SUMMARY_FILE),
                &self.processed_dir.join(LONG_TABLE_FILE),
            )
        });

        Ok(FetchRun {
            catalog_path: self.entity_catalog.clone(),
            raw_dir: self.raw_dir.clone(),
            level: self.level,
            metrics: parse_metrics_arg(Some(&self.metrics)),
            limit_entities: self.limit_entities,
            start,
            end,
            last_run,
            initial: self
                .initial_chunk_mode
                .unwrap_or(config.fetch_defaults.chunking.initial),
            options: chunk_options(
                config,
                self.max_points,
                self.max_response_bytes,
                self.dry_run,
                self.overwrite,
            )?,
        })
    }

    /// Execute the fetch command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let run = self.to_run(&config)?;
        if !run.catalog_path.exists() {
            return Err(CliError::InvalidArgument(format!(
                "{} not found at {}; run `discover` first",
                CATALOG_FILE,
                run.catalog_path.display()
            )));
        }
        let client = cli.build_client(&config)?;

        let pb = create_progress_bar(0, "Fetching");
        let report = run_fetch(&client, &run, Utc::now(), Some(shutdown), Some(&pb)).await;
        pb.finish_and_clear();
        let report = report?;

        for (label, plan) in &report.planned {
            println!("PLAN {label} {plan}");
        }
        println!("Fetch complete. {}", report.summary);
        Ok(())
    }
}
