//! Discover command implementation

use clap::Args;
use std::path::PathBuf;

use super::{create_progress_bar, Cli, CliError};
use crate::catalog::discovery::{run_discovery, DiscoveryOptions};
use crate::downloader::parse_metrics_arg;

/// Resolve entities and datasources, probe coverage and write the catalog
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Skip region discovery
    #[arg(long)]
    pub no_regions: bool,

    /// Skip coverage probing; catalog coverage columns stay empty
    #[arg(long)]
    pub no_probe_coverage: bool,

    /// Comma-separated datasources to probe, or `auto` for all
    #[arg(long, default_value = "auto")]
    pub metrics: String,

    /// Keep the first N countries and N regions
    #[arg(long)]
    pub limit_entities: Option<usize>,

    /// Ignore cached coverage and probe again
    #[arg(long)]
    pub refresh_coverage: bool,

    /// Entity catalog output
    #[arg(long, default_value = "data/processed/entity_catalog.csv")]
    pub entity_catalog: PathBuf,

    /// Markdown catalog report
    #[arg(long, default_value = "docs/entity_catalog.md")]
    pub catalog_report: PathBuf,

    /// JSON snapshot of everything discovery resolved
    #[arg(long, default_value = "data/intermediate/discovery_snapshot.json")]
    pub snapshot: PathBuf,
}

impl DiscoverArgs {
    /// Execute the discover command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let client = cli.build_client(&config)?;

        let options = DiscoveryOptions {
            include_regions: !self.no_regions,
            probe_coverage: !self.no_probe_coverage,
            metrics: parse_metrics_arg(Some(&self.metrics)),
            limit_entities: self.limit_entities,
            refresh_coverage: self.refresh_coverage,
            catalog_path: self.entity_catalog.clone(),
            markdown_path: self.catalog_report.clone(),
            snapshot_path: self.snapshot.clone(),
        };

        let pb = create_progress_bar(0, "Probing coverage");
        let output = run_discovery(&client, &config, &options, None, Some(&pb)).await;
        pb.finish_and_clear();
        let output = output?;

        println!("Discovery complete. entity_catalog rows={}", output.catalog.len());
        for path in [&options.catalog_path, &options.markdown_path, &options.snapshot_path] {
            println!("Wrote: {}", path.display());
        }
        Ok(())
    }
}
