//! QA pass over the long table
//!
//! - [`stats`] - Per-series statistics
//! - [`report`] - Markdown rendering
//!
//! The summary also feeds incremental fetches: [`last_run_lookup`] reports the
//! latest timestamp already processed per (level, entity, metric).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

pub mod report;
pub mod stats;

pub use report::render_qa_report;
pub use stats::{build_qa_summary, QaSummaryRow, QA_COLUMNS};

use crate::output::csv::{read_records, write_records};
use crate::output::{write_text, OutputError};
use crate::transform::{load_long_table, TransformError};

/// QA errors
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    /// Long table could not be read
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Summary or report could not be written
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Result type for QA operations
pub type QaResult<T> = Result<T, QaError>;

/// Summarise `long_path` into `summary_path` and `report_path`.
///
/// A missing long table yields an empty summary and a report saying so.
pub fn run_qa(
    long_path: &Path,
    summary_path: &Path,
    report_path: &Path,
    now: DateTime<Utc>,
) -> QaResult<Vec<QaSummaryRow>> {
    let summary = if long_path.exists() {
        let long = load_long_table(long_path)?;
        build_qa_summary(&long)
    } else {
        warn!(path = %long_path.display(), "Long table not found, writing empty QA outputs");
        Vec::new()
    };

    write_records(summary_path, &QA_COLUMNS, &summary)?;
    write_text(report_path, &render_qa_report(&summary, now))?;
    info!(groups = summary.len(), "QA complete");
    Ok(summary)
}

/// Key of the since-last-run lookup: (level, entity_id, metric)
pub type LastRunKey = (String, String, String);

fn record_max(
    lookup: &mut HashMap<LastRunKey, DateTime<Utc>>,
    level: &str,
    entity_id: &str,
    metric: &str,
    ts: DateTime<Utc>,
) {
    lookup
        .entry((level.to_string(), entity_id.to_string(), metric.to_string()))
        .and_modify(|prev| *prev = (*prev).max(ts))
        .or_insert(ts);
}

/// Latest processed timestamp per (level, entity, metric).
///
/// Read from the QA summary when present, else from the long table. Missing
/// or unreadable files give an empty lookup, so an incremental run falls
/// back to a full one.
pub fn last_run_lookup(summary_path: &Path, long_path: &Path) -> HashMap<LastRunKey, DateTime<Utc>> {
    let mut lookup: HashMap<LastRunKey, DateTime<Utc>> = HashMap::new();

    if summary_path.exists() {
        match read_records::<QaSummaryRow>(summary_path) {
            Ok(rows) => {
                for row in &rows {
                    if let Some(ts) = row.max_timestamp_utc {
                        record_max(&mut lookup, &row.level, &row.entity_id, &row.metric, ts);
                    }
                }
                info!(entries = lookup.len(), source = %summary_path.display(), "Loaded last-run timestamps");
                return lookup;
            }
            Err(e) => {
                warn!(path = %summary_path.display(), error = %e, "Unreadable QA summary, trying long table");
            }
        }
    }

    if long_path.exists() {
        match load_long_table(long_path) {
            Ok(rows) => {
                for row in &rows {
                    record_max(&mut lookup, &row.level, &row.entity_id, &row.metric, row.timestamp_utc);
                }
                info!(entries = lookup.len(), source = %long_path.display(), "Loaded last-run timestamps");
            }
            Err(e) => {
                warn!(path = %long_path.display(), error = %e, "Unreadable long table, fetching full windows");
            }
        }
    }
    lookup
}
