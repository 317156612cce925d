//! QA command implementation

use chrono::Utc;
use clap::Args;
use std::path::PathBuf;

use super::{Cli, CliError};
use crate::qa::run_qa;

/// Summarise the long table into a CSV summary and a Markdown report
#[derive(Args, Debug)]
pub struct QaArgs {
    /// Long table written by `build-panel`
    #[arg(long, default_value = "data/processed/ioda_long.csv")]
    pub long_path: PathBuf,

    /// QA summary output
    #[arg(long, default_value = "data/processed/qa_summary.csv")]
    pub qa_summary_path: PathBuf,

    /// Markdown report output
    #[arg(long, default_value = "docs/qa_report.md")]
    pub qa_report_path: PathBuf,
}

impl QaArgs {
    /// Execute the qa command
    pub fn execute(&self, _cli: &Cli) -> Result<(), CliError> {
        let summary = run_qa(
            &self.long_path,
            &self.qa_summary_path,
            &self.qa_report_path,
            Utc::now(),
        )?;
        println!("QA complete. summary rows={}", summary.len());
        println!("Wrote: {}", self.qa_summary_path.display());
        println!("Wrote: {}", self.qa_report_path.display());
        Ok(())
    }
}
