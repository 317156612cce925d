//! Build-panel command implementation

use clap::Args;
use std::path::PathBuf;

use super::{Cli, CliError};
use crate::transform::{render_validation_samples, run_build_panel};

/// Build the long table and wide panels from the raw archive
#[derive(Args, Debug)]
pub struct BuildPanelArgs {
    /// Raw archive root
    #[arg(long, default_value = "data/raw")]
    pub raw_dir: PathBuf,

    /// Entity catalog used for names, parents and units
    #[arg(long, default_value = "data/processed/entity_catalog.csv")]
    pub entity_catalog: PathBuf,

    /// Output directory
    #[arg(long, default_value = "data/processed")]
    pub processed_dir: PathBuf,
}

impl BuildPanelArgs {
    /// Execute the build-panel command
    pub fn execute(&self, _cli: &Cli) -> Result<(), CliError> {
        let outputs = run_build_panel(&self.raw_dir, &self.entity_catalog, &self.processed_dir)?;

        println!("Built long rows: {}", outputs.long.len());
        println!("Country panel rows: {}", outputs.country_panel.rows.len());
        println!("Region panel rows: {}", outputs.region_panel.rows.len());
        println!("Validation samples:");
        for line in render_validation_samples(&outputs.samples) {
            println!("{line}");
        }
        for path in &outputs.written {
            println!("Wrote: {}", path.display());
        }
        Ok(())
    }
}
