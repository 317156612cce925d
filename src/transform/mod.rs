//! Raw → long → wide reshaping
//!
//! - [`long`] - Expansion of raw series into the long table
//! - [`panel`] - Per-level wide panels and validation samples

use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod long;
pub mod panel;

pub use long::{build_long_table, expand_value, LongRow, LONG_COLUMNS};
pub use panel::{
    build_wide_panels, render_validation_samples, validation_samples, ValidationSample, WidePanel,
};

use crate::catalog::{load_catalog, CatalogError, CatalogRow};
use crate::output::csv::{read_records, write_records, write_table};
use crate::output::path::{
    COUNTRY_PANEL_FILE, LONG_TABLE_FILE, REGION_PANEL_FILE, VALIDATION_SAMPLES_FILE,
};
use crate::output::{write_json, OutputError};

/// Transform errors
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Raw archive could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// Raw file is not valid JSON
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Offending file
        path: String,
        /// Parser message
        message: String,
    },

    /// Catalog could not be read
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Processed output could not be written
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Result type for transform operations
pub type TransformResult<T> = Result<T, TransformError>;

/// Entity samples printed after a build
pub const SAMPLE_ENTITIES_PER_LEVEL: usize = 2;

/// What a build-panel run produced
#[derive(Debug, Clone)]
pub struct BuildOutputs {
    /// Long table
    pub long: Vec<LongRow>,
    /// Country panel
    pub country_panel: WidePanel,
    /// Region panel
    pub region_panel: WidePanel,
    /// Validation samples
    pub samples: Vec<ValidationSample>,
    /// Files written, in write order
    pub written: Vec<PathBuf>,
}

/// Catalog rows, or none when the catalog was never written
pub fn load_catalog_or_empty(path: &Path) -> TransformResult<Vec<CatalogRow>> {
    match load_catalog(path) {
        Ok(rows) => Ok(rows),
        Err(CatalogError::Output(OutputError::NotFound(_))) => {
            warn!(path = %path.display(), "Entity catalog not found, metadata join skipped");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Read a long table written by [`run_build_panel`]
pub fn load_long_table(path: &Path) -> TransformResult<Vec<LongRow>> {
    Ok(read_records(path)?)
}

/// Build the long table and panels from `raw_dir` and write them to
/// `processed_dir`.
///
/// The country panel is always written; the region panel only when it has
/// rows.
pub fn run_build_panel(
    raw_dir: &Path,
    catalog_path: &Path,
    processed_dir: &Path,
) -> TransformResult<BuildOutputs> {
    let span = tracing::info_span!("build_panel", raw_dir = %raw_dir.display());
    let _enter = span.enter();

    let catalog = load_catalog_or_empty(catalog_path)?;
    let long = build_long_table(raw_dir, &catalog)?;
    let (country_panel, region_panel) = build_wide_panels(&long);
    let samples = validation_samples(&long, SAMPLE_ENTITIES_PER_LEVEL);

    let mut written = Vec::new();

    let long_path = processed_dir.join(LONG_TABLE_FILE);
    write_records(&long_path, &LONG_COLUMNS, &long)?;
    written.push(long_path);

    let country_path = processed_dir.join(COUNTRY_PANEL_FILE);
    write_table(&country_path, &country_panel.header, &country_panel.rows)?;
    written.push(country_path);

    if !region_panel.is_empty() {
        let region_path = processed_dir.join(REGION_PANEL_FILE);
        write_table(&region_path, &region_panel.header, &region_panel.rows)?;
        written.push(region_path);
    }

    let samples_path = processed_dir.join(VALIDATION_SAMPLES_FILE);
    write_json(&samples_path, &samples)?;
    written.push(samples_path);

    info!(
        long_rows = long.len(),
        country_rows = country_panel.rows.len(),
        region_rows = region_panel.rows.len(),
        "Build panel complete"
    );

    Ok(BuildOutputs {
        long,
        country_panel,
        region_panel,
        samples,
        written,
    })
}
