//! Path layout for the raw archive and processed outputs
//!
//! Raw chunks live at `<raw_dir>/<level>/<metric>/<entity>/<start>_<end>.json`
//! with every component passed through [`sanitize_component`]. The two epoch
//! bounds in the file name are the only record of the window a body covers.
//!
//! ```rust
//! use ioda_pipeline::output::RawPathBuilder;
//! use ioda_pipeline::{EntityType, TimeWindow};
//! use std::path::PathBuf;
//!
//! let window = TimeWindow::from_epoch(1771545600, 1771632000).unwrap();
//! let path = RawPathBuilder::new("data/raw", EntityType::Region, "ping-slash24", "4321")
//!     .chunk(&window);
//! assert_eq!(
//!     path,
//!     PathBuf::from("data/raw/region/ping-slash24/4321/1771545600_1771632000.json")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::{EntityType, TimeWindow};

/// Long table file name
pub const LONG_TABLE_FILE: &str = "ioda_long.csv";
/// Country panel file name
pub const COUNTRY_PANEL_FILE: &str = "ioda_country_panel.csv";
/// Region panel file name
pub const REGION_PANEL_FILE: &str = "ioda_region_panel.csv";
/// QA summary file name
pub const QA_SUMMARY_FILE: &str = "qa_summary.csv";
/// Entity catalog file name
pub const CATALOG_FILE: &str = "entity_catalog.csv";
/// Validation samples file name
pub const VALIDATION_SAMPLES_FILE: &str = "validation_samples.json";

/// Replace every run of characters outside `[A-Za-z0-9._=-]` with `_`.
///
/// Leading and trailing underscores are trimmed; an empty result becomes
/// `unknown`.
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '=' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds raw chunk paths for one target
#[derive(Debug, Clone)]
pub struct RawPathBuilder {
    root_dir: PathBuf,
    level: String,
    metric: String,
    entity: String,
}

impl RawPathBuilder {
    /// Create a builder
    ///
    /// # Arguments
    ///
    /// * `root_dir` - Raw archive root
    /// * `level` - Entity level (`country`/`region`)
    /// * `metric` - Datasource
    /// * `entity` - Entity code
    pub fn new(root_dir: impl Into<PathBuf>, level: EntityType, metric: &str, entity: &str) -> Self {
        Self {
            root_dir: root_dir.into(),
            level: sanitize_component(level.as_str()),
            metric: sanitize_component(metric),
            entity: sanitize_component(entity),
        }
    }

    /// Directory holding this target's chunks
    pub fn directory(&self) -> PathBuf {
        self.root_dir
            .join(&self.level)
            .join(&self.metric)
            .join(&self.entity)
    }

    /// File for `window`
    pub fn chunk(&self, window: &TimeWindow) -> PathBuf {
        self.directory()
            .join(format!("{}.json", window.filename_stem()))
    }
}

/// Recover `(start, end)` epoch bounds from a chunk file name
pub fn parse_window_from_filename(path: &Path) -> Option<(i64, i64)> {
    let stem = path.file_stem()?.to_str()?;
    let (start, end) = stem.split_once('_')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(start) || !all_digits(end) {
        return None;
    }
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Every `*.json` file below `root`, sorted
pub fn collect_raw_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
