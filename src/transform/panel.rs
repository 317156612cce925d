//! Long table → per-level wide panels, plus the validation sample printout

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::long::LongRow;
use crate::isoformat_utc;

/// Leading columns of every panel
pub const PANEL_INDEX_COLUMNS: [&str; 5] = [
    "timestamp_utc",
    "entity_id",
    "entity_name",
    "parent_country_id",
    "parent_country_name",
];

/// One level pivoted to one column per metric variant
#[derive(Debug, Clone, PartialEq)]
pub struct WidePanel {
    /// Index columns followed by sorted metric columns
    pub header: Vec<String>,
    /// Cells as text; missing values are empty
    pub rows: Vec<Vec<String>>,
}

impl WidePanel {
    /// `true` when the panel has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `column` in the header
    pub fn column(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|c| c == column)
    }
}

/// `metric`, or `metric__variant` when the variant is set
pub fn wide_column_name(metric: &str, series_variant: &str) -> String {
    if series_variant.is_empty() {
        metric.to_string()
    } else {
        format!("{metric}__{series_variant}")
    }
}

/// Sort key of a panel row: entity first, then time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PanelIndex {
    entity_id: String,
    timestamp_utc: DateTime<Utc>,
    entity_name: String,
    parent_country_id: String,
    parent_country_name: String,
}

impl PanelIndex {
    fn of(row: &LongRow) -> Self {
        Self {
            entity_id: row.entity_id.clone(),
            timestamp_utc: row.timestamp_utc,
            entity_name: row.entity_name.clone().unwrap_or_default(),
            parent_country_id: row.parent_country_id.clone().unwrap_or_default(),
            parent_country_name: row.parent_country_name.clone().unwrap_or_default(),
        }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            isoformat_utc(self.timestamp_utc),
            self.entity_id.clone(),
            self.entity_name.clone(),
            self.parent_country_id.clone(),
            self.parent_country_name.clone(),
        ]
    }
}

/// Pivot the rows of one level.
///
/// Null values are ignored, so index rows and metric columns that never see
/// a value do not appear. Within a cell the first value wins.
pub fn build_wide_panel(rows: &[LongRow], level: &str) -> WidePanel {
    let mut cells: BTreeMap<PanelIndex, BTreeMap<String, f64>> = BTreeMap::new();
    let mut columns: BTreeSet<String> = BTreeSet::new();

    for row in rows.iter().filter(|r| r.level == level) {
        let Some(value) = row.value else {
            continue;
        };
        let column = wide_column_name(&row.metric, &row.series_variant);
        cells
            .entry(PanelIndex::of(row))
            .or_default()
            .entry(column.clone())
            .or_insert(value);
        columns.insert(column);
    }

    let mut header: Vec<String> = PANEL_INDEX_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(columns.iter().cloned());

    let rows = cells
        .into_iter()
        .map(|(index, values)| {
            let mut line = index.cells();
            line.extend(
                columns
                    .iter()
                    .map(|c| values.get(c).map(f64::to_string).unwrap_or_default()),
            );
            line
        })
        .collect();
    WidePanel { header, rows }
}

/// Country and region panels
pub fn build_wide_panels(rows: &[LongRow]) -> (WidePanel, WidePanel) {
    (build_wide_panel(rows, "country"), build_wide_panel(rows, "region"))
}

/// One long row as shown in a validation sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    /// Observation time
    pub timestamp_utc: String,
    /// Metric
    pub metric: String,
    /// Variant
    pub series_variant: String,
    /// Value
    pub value: Option<f64>,
}

impl From<&LongRow> for SampleRow {
    fn from(row: &LongRow) -> Self {
        Self {
            timestamp_utc: isoformat_utc(row.timestamp_utc),
            metric: row.metric.clone(),
            series_variant: row.series_variant.clone(),
            value: row.value,
        }
    }
}

/// Quick look at one entity of the long table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSample {
    /// Level
    pub level: String,
    /// Entity code
    pub entity_id: String,
    /// Entity name
    pub entity_name: Option<String>,
    /// Rows for this entity
    pub count: usize,
    /// Earliest timestamp
    pub min_ts: String,
    /// Latest timestamp
    pub max_ts: String,
    /// First three rows
    pub head: Vec<SampleRow>,
    /// Last three rows
    pub tail: Vec<SampleRow>,
}

const SAMPLE_EDGE_ROWS: usize = 3;

/// First `max_entities_each` entities (by id) of each level
pub fn validation_samples(rows: &[LongRow], max_entities_each: usize) -> Vec<ValidationSample> {
    let mut samples = Vec::new();
    for level in ["country", "region"] {
        let level_rows: Vec<&LongRow> = rows.iter().filter(|r| r.level == level).collect();
        let entity_ids: BTreeSet<&str> = level_rows.iter().map(|r| r.entity_id.as_str()).collect();

        for entity_id in entity_ids.into_iter().take(max_entities_each) {
            let entity_rows: Vec<&LongRow> = level_rows
                .iter()
                .copied()
                .filter(|r| r.entity_id == entity_id)
                .collect();
            let (Some(min_ts), Some(max_ts)) = (
                entity_rows.iter().map(|r| r.timestamp_utc).min(),
                entity_rows.iter().map(|r| r.timestamp_utc).max(),
            ) else {
                continue;
            };
            let tail_start = entity_rows.len().saturating_sub(SAMPLE_EDGE_ROWS);
            samples.push(ValidationSample {
                level: level.to_string(),
                entity_id: entity_id.to_string(),
                entity_name: entity_rows.iter().find_map(|r| r.entity_name.clone()),
                count: entity_rows.len(),
                min_ts: isoformat_utc(min_ts),
                max_ts: isoformat_utc(max_ts),
                head: entity_rows
                    .iter()
                    .take(SAMPLE_EDGE_ROWS)
                    .map(|r| SampleRow::from(*r))
                    .collect(),
                tail: entity_rows[tail_start..]
                    .iter()
                    .map(|r| SampleRow::from(*r))
                    .collect(),
            });
        }
    }
    samples
}

fn render_sample_rows(lines: &mut Vec<String>, rows: &[SampleRow]) {
    for row in rows {
        lines.push(format!(
            "  {} {} {} {}",
            row.timestamp_utc,
            row.metric,
            if row.series_variant.is_empty() { "-" } else { &row.series_variant },
            row.value.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
        ));
    }
}

/// Plain-text rendering for the terminal
pub fn render_validation_samples(samples: &[ValidationSample]) -> Vec<String> {
    if samples.is_empty() {
        return vec!["No rows in long table.".to_string()];
    }
    let mut lines = Vec::new();
    for level in ["country", "region"] {
        let level_samples: Vec<&ValidationSample> =
            samples.iter().filter(|s| s.level == level).collect();
        if level_samples.is_empty() {
            lines.push(format!("{level}: no data"));
            continue;
        }
        for sample in level_samples {
            lines.push(format!(
                "{} {} ({}): count={} min_ts={} max_ts={}",
                sample.level,
                sample.entity_id,
                sample.entity_name.as_deref().unwrap_or(""),
                sample.count,
                sample.min_ts,
                sample.max_ts
            ));
            lines.push("head:".to_string());
            render_sample_rows(&mut lines, &sample.head);
            lines.push("tail:".to_string());
            render_sample_rows(&mut lines, &sample.tail);
        }
    }
    lines
}
