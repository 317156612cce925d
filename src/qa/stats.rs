//! Per-series statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::transform::LongRow;

/// Column order of `qa_summary.csv`
pub const QA_COLUMNS: [&str; 20] = [
    "level",
    "entity_id",
    "entity_name",
    "metric",
    "series_variant",
    "metric_key",
    "unit",
    "min_timestamp_utc",
    "max_timestamp_utc",
    "n_rows",
    "n_non_null",
    "n_null",
    "null_fraction",
    "median_step_seconds",
    "max_gap_seconds",
    "gap_count",
    "negative_count",
    "bounded_range_violations",
    "spike_count",
    "duplicate_rows",
];

/// Gaps longer than this multiple of the median step are counted
pub const GAP_FACTOR: f64 = 1.5;

/// Values above Q3 + this multiple of the IQR are spikes
pub const SPIKE_IQR_FACTOR: f64 = 10.0;

/// Fewer non-null values than this skip spike detection
pub const SPIKE_MIN_VALUES: usize = 8;

/// Statistics for one (level, entity, metric, variant, unit) series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSummaryRow {
    /// Level
    pub level: String,
    /// Entity code
    pub entity_id: String,
    /// Entity name
    pub entity_name: Option<String>,
    /// Metric
    pub metric: String,
    /// Variant label
    pub series_variant: String,
    /// `metric` or `metric__variant`
    pub metric_key: String,
    /// Unit
    pub unit: Option<String>,
    /// Earliest row
    pub min_timestamp_utc: Option<DateTime<Utc>>,
    /// Latest row
    pub max_timestamp_utc: Option<DateTime<Utc>>,
    /// Rows
    pub n_rows: u64,
    /// Rows with a value
    pub n_non_null: u64,
    /// Rows without a value
    pub n_null: u64,
    /// `n_null / n_rows`
    pub null_fraction: f64,
    /// Median spacing of non-null observations
    pub median_step_seconds: Option<f64>,
    /// Largest spacing of non-null observations
    pub max_gap_seconds: Option<f64>,
    /// Spacings above the gap threshold
    pub gap_count: u64,
    /// Negative values
    pub negative_count: u64,
    /// Values outside the range implied by the unit or metric name
    pub bounded_range_violations: u64,
    /// Values above the spike threshold
    pub spike_count: u64,
    /// Rows whose key collided with another row before de-duplication
    pub duplicate_rows: u64,
}

impl QaSummaryRow {
    /// Negative, out-of-range and spike counts combined
    pub fn anomaly_total(&self) -> u64 {
        self.negative_count + self.bounded_range_violations + self.spike_count
    }
}

/// Linear-interpolated quantile of sorted values
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

fn sorted_floats(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Range a value must stay in, from the unit or metric name
fn value_bounds(unit: &str, metric: &str) -> Option<(f64, f64)> {
    if unit.contains("Percentage") {
        Some((0.0, 100.0))
    } else if unit.contains("Normalized") || metric.contains("norm") {
        Some((0.0, 10.0))
    } else {
        None
    }
}

/// Count non-null values more than [`SPIKE_IQR_FACTOR`] IQRs above Q3
pub fn spike_count(values: &[f64]) -> u64 {
    if values.len() < SPIKE_MIN_VALUES {
        return 0;
    }
    let sorted = sorted_floats(values.iter().copied());
    let (Some(q1), Some(q3)) = (quantile(&sorted, 0.25), quantile(&sorted, 0.75)) else {
        return 0;
    };
    let iqr = q3 - q1;
    if iqr <= 0.0 {
        return 0;
    }
    let threshold = q3 + SPIKE_IQR_FACTOR * iqr;
    values.iter().filter(|v| **v > threshold).count() as u64
}

/// Statistics of one group, `None` when it is empty
fn summarise_group(rows: &mut [&LongRow]) -> Option<QaSummaryRow> {
    rows.sort_by_key(|r| r.timestamp_utc);
    let first = *rows.first()?;

    let non_null: Vec<(DateTime<Utc>, f64)> = rows
        .iter()
        .filter_map(|r| r.value.map(|v| (r.timestamp_utc, v)))
        .collect();
    let values: Vec<f64> = non_null.iter().map(|(_, v)| *v).collect();

    let diffs: Vec<f64> = non_null
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].0).num_seconds() as f64)
        .collect();
    let sorted_diffs = sorted_floats(diffs.iter().copied());
    let median_step = quantile(&sorted_diffs, 0.5);
    let max_gap = sorted_diffs.last().copied();
    let gap_count = match median_step {
        Some(median) if median > 0.0 => {
            diffs.iter().filter(|d| **d > GAP_FACTOR * median).count() as u64
        }
        _ => 0,
    };

    let unit = rows.iter().find_map(|r| r.unit.clone());
    let bounded_range_violations = value_bounds(unit.as_deref().unwrap_or(""), &first.metric)
        .map(|(lo, hi)| values.iter().filter(|v| **v < lo || **v > hi).count() as u64)
        .unwrap_or(0);

    let n_rows = rows.len() as u64;
    let n_non_null = values.len() as u64;
    let n_null = n_rows - n_non_null;

    Some(QaSummaryRow {
        level: first.level.clone(),
        entity_id: first.entity_id.clone(),
        entity_name: first.entity_name.clone(),
        metric: first.metric.clone(),
        series_variant: first.series_variant.clone(),
        metric_key: crate::transform::panel::wide_column_name(&first.metric, &first.series_variant),
        unit,
        min_timestamp_utc: rows.first().map(|r| r.timestamp_utc),
        max_timestamp_utc: rows.last().map(|r| r.timestamp_utc),
        n_rows,
        n_non_null,
        n_null,
        null_fraction: n_null as f64 / n_rows as f64,
        median_step_seconds: median_step,
        max_gap_seconds: max_gap,
        gap_count,
        negative_count: values.iter().filter(|v| **v < 0.0).count() as u64,
        bounded_range_violations,
        spike_count: spike_count(&values),
        duplicate_rows: rows.iter().filter(|r| r.duplicate_key_count > 1).count() as u64,
    })
}

type GroupKey<'a> = (
    &'a str,
    &'a str,
    Option<&'a str>,
    &'a str,
    &'a str,
    Option<&'a str>,
);

/// One summary row per (level, entity, name, metric, variant, unit), sorted
/// by (level, entity, metric key)
pub fn build_qa_summary(rows: &[LongRow]) -> Vec<QaSummaryRow> {
    let mut groups: BTreeMap<GroupKey<'_>, Vec<&LongRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((
                row.level.as_str(),
                row.entity_id.as_str(),
                row.entity_name.as_deref(),
                row.metric.as_str(),
                row.series_variant.as_str(),
                row.unit.as_deref(),
            ))
            .or_default()
            .push(row);
    }

    let mut summary: Vec<QaSummaryRow> = groups
        .into_values()
        .filter_map(|mut group| summarise_group(&mut group))
        .collect();
    summary.sort_by(|a, b| {
        (&a.level, &a.entity_id, &a.metric_key).cmp(&(&b.level, &b.entity_id, &b.metric_key))
    });
    summary
}
