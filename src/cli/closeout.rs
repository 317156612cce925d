//! Monthly closeout: fetch one closed calendar month, then rebuild the
//! processed outputs and QA

use chrono::{DateTime, Datelike, TimeZone, Utc};
use clap::Args;
use std::path::PathBuf;

use super::fetch::{chunk_options, run_fetch, FetchRun};
use super::{create_progress_bar, Cli, CliError};
use crate::downloader::parse_metrics_arg;
use crate::downloader::window::{month_window, parse_month, previous_month};
use crate::output::path::{LONG_TABLE_FILE, QA_SUMMARY_FILE};
use crate::qa::run_qa;
use crate::shutdown::SharedShutdown;
use crate::transform::run_build_panel;
use crate::{isoformat_utc, Granularity, LevelFilter, TimeWindow};

/// Fetch one closed calendar month, then rebuild panels and QA
#[derive(Args, Debug)]
pub struct CloseoutArgs {
    /// Target month as YYYY-MM (default: previous UTC month)
    #[arg(long)]
    pub month: Option<String>,

    /// Allow a partial fetch of the current UTC month
    #[arg(long)]
    pub allow_current_month: bool,

    /// Entity catalog written by `discover`
    #[arg(long, default_value = "data/processed/entity_catalog.csv")]
    pub entity_catalog: PathBuf,

    /// Raw archive root
    #[arg(long, default_value = "data/raw")]
    pub raw_dir: PathBuf,

    /// Processed outputs
    #[arg(long, default_value = "data/processed")]
    pub processed_dir: PathBuf,

    /// Markdown QA report
    #[arg(long, default_value = "docs/qa_report.md")]
    pub qa_report_path: PathBuf,

    /// Entity level: country, region or both
    #[arg(long, default_value = "both")]
    pub level: LevelFilter,

    /// Comma-separated datasources
    #[arg(long, default_value = "ping-slash24")]
    pub metrics: String,

    /// Re-fetch the month's raw files
    #[arg(long)]
    pub overwrite: bool,

    /// Skip build-panel after the fetch
    #[arg(long)]
    pub no_build: bool,

    /// Skip QA after build-panel
    #[arg(long)]
    pub no_qa: bool,

    /// Print the month window and chunk plan only
    #[arg(long)]
    pub dry_run: bool,

    /// `maxPoints` per signals request
    #[arg(long)]
    pub max_points: Option<u32>,

    /// Split responses larger than this many bytes
    #[arg(long)]
    pub max_response_bytes: Option<usize>,

    /// First rung of the chunk ladder
    #[arg(long, default_value = "month")]
    pub initial_chunk_mode: Granularity,
}

/// Window of the month to close out.
///
/// # Errors
/// A malformed month, the current month without `allow_current_month`, or a
/// month that starts after `now`.
pub fn closeout_window(
    month: Option<&str>,
    allow_current_month: bool,
    now: DateTime<Utc>,
) -> Result<(String, TimeWindow), CliError> {
    let (year, month) = match month {
        Some(m) => parse_month(m)?,
        None => previous_month(now),
    };
    let window = month_window(year, month)?;
    let label = format!("{year:04}-{month:02}");

    let current_month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid clock: {now}")))?;
    if window.start == current_month_start && !allow_current_month {
        return Err(CliError::InvalidArgument(
            "Refusing to close out the current UTC month by default. \
             Use --allow-current-month if you explicitly want a partial-month fetch."
                .to_string(),
        ));
    }
    if window.start > now {
        return Err(CliError::InvalidArgument(format!(
            "Target month {label} is in the future."
        )));
    }
    Ok((label, window))
}

impl CloseoutArgs {
    /// Execute the closeout command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let now = Utc::now();
        let (label, window) = closeout_window(self.month.as_deref(), self.allow_current_month, now)?;
        let config = cli.load_config()?;

        println!("Monthly closeout target: {label}");
        println!(
            "Window UTC (exclusive end): {} -> {}",
            isoformat_utc(window.start),
            isoformat_utc(window.end)
        );
        println!(
            "Calendar days in month: {}",
            (window.end - window.start).num_days()
        );
        if self.overwrite {
            println!("Raw overwrite mode: ON");
        } else {
            println!("Raw overwrite mode: OFF (existing month chunk files will be skipped)");
        }

        let run = FetchRun {
            catalog_path: self.entity_catalog.clone(),
            raw_dir: self.raw_dir.clone(),
            level: self.level,
            metrics: parse_metrics_arg(Some(&self.metrics)),
            limit_entities: None,
            start: Some(window.start),
            end: Some(window.end),
            last_run: None,
            initial: self.initial_chunk_mode,
            options: chunk_options(
                &config,
                self.max_points,
                self.max_response_bytes,
                self.dry_run,
                self.overwrite,
            )?,
        };
        let client = cli.build_client(&config)?;
        let pb = create_progress_bar(0, format!("Closing out {label}"));
        let report = run_fetch(&client, &run, now, Some(shutdown), Some(&pb)).await;
        pb.finish_and_clear();
        let report = report?;

        for (target, plan) in &report.planned {
            println!("PLAN {target} {plan}");
        }
        println!("Fetch complete. {}", report.summary);
        if self.dry_run {
            return Ok(());
        }

        if self.no_build {
            println!("Build panel skipped (--no-build).");
        } else {
            let outputs =
                run_build_panel(&self.raw_dir, &self.entity_catalog, &self.processed_dir)?;
            println!(
                "Build panel complete. long_rows={} country_panel_rows={} region_panel_rows={}",
                outputs.long.len(),
                outputs.country_panel.rows.len(),
                outputs.region_panel.rows.len()
            );
        }

        if self.no_qa {
            println!("QA skipped (--no-qa).");
        } else if self.no_build {
            println!("QA skipped because build was skipped.");
        } else {
            let summary = run_qa(
                &self.processed_dir.join(LONG_TABLE_FILE),
                &self.processed_dir.join(QA_SUMMARY_FILE),
                &self.qa_report_path,
                Utc::now(),
            )?;
            println!("QA complete. summary_rows={}", summary.len());
        }
        Ok(())
    }
}
