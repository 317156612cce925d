//! Markdown QA report

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::stats::QaSummaryRow;
use crate::isoformat_utc;

/// Rows shown per report table
pub const REPORT_TOP_N: usize = 10;

/// One rendered cell
enum Cell {
    Text(String),
    Int(u64),
    Float(Option<f64>),
    Time(Option<DateTime<Utc>>),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(v) => v.map(|v| format!("{v:.4}")).unwrap_or_default(),
            Cell::Time(t) => t.map(isoformat_utc).unwrap_or_default(),
        }
    }
}

fn cell(row: &QaSummaryRow, column: &str) -> Cell {
    match column {
        "level" => Cell::Text(row.level.clone()),
        "entity_id" => Cell::Text(row.entity_id.clone()),
        "metric_key" => Cell::Text(row.metric_key.clone()),
        "n_rows" => Cell::Int(row.n_rows),
        "n_null" => Cell::Int(row.n_null),
        "null_fraction" => Cell::Float(Some(row.null_fraction)),
        "min_timestamp_utc" => Cell::Time(row.min_timestamp_utc),
        "max_timestamp_utc" => Cell::Time(row.max_timestamp_utc),
        "median_step_seconds" => Cell::Float(row.median_step_seconds),
        "max_gap_seconds" => Cell::Float(row.max_gap_seconds),
        "gap_count" => Cell::Int(row.gap_count),
        "negative_count" => Cell::Int(row.negative_count),
        "bounded_range_violations" => Cell::Int(row.bounded_range_violations),
        "spike_count" => Cell::Int(row.spike_count),
        "duplicate_rows" => Cell::Int(row.duplicate_rows),
        _ => Cell::Text(String::new()),
    }
}

/// Descending order with missing values last
fn desc_opt(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn add_table(lines: &mut Vec<String>, title: &str, rows: &[&QaSummaryRow], columns: &[&str]) {
    lines.push(format!("## {title}"));
    lines.push(String::new());
    if rows.is_empty() {
        lines.push("- None".to_string());
        lines.push(String::new());
        return;
    }
    lines.push(format!("| {} |", columns.join(" | ")));
    lines.push(format!("|{}|", vec!["---"; columns.len()].join("|")));
    for row in rows.iter().take(REPORT_TOP_N) {
        let cells: Vec<String> = columns.iter().map(|c| cell(row, c).render()).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.push(String::new());
}

/// Render the QA report for `summary`
pub fn render_qa_report(summary: &[QaSummaryRow], generated_at: DateTime<Utc>) -> String {
    let mut lines: Vec<String> = vec![
        "# QA Report".to_string(),
        String::new(),
        format!("- Generated at: `{}`", isoformat_utc(generated_at)),
    ];
    if summary.is_empty() {
        lines.push("- No data available (`ioda_long.csv` empty or missing).".to_string());
        lines.push(String::new());
        return lines.join("\n");
    }

    let total_rows: u64 = summary.iter().map(|r| r.n_rows).sum();
    lines.push(format!("- QA groups (entity x metric x variant): `{}`", summary.len()));
    lines.push(format!("- Total rows represented: `{total_rows}`"));
    lines.push(String::new());

    lines.push("## Totals".to_string());
    lines.push(String::new());
    let totals: [(&str, fn(&QaSummaryRow) -> u64); 5] = [
        ("negative_count", |r| r.negative_count),
        ("bounded_range_violations", |r| r.bounded_range_violations),
        ("spike_count", |r| r.spike_count),
        ("duplicate_rows", |r| r.duplicate_rows),
        ("gap_count", |r| r.gap_count),
    ];
    for (name, get) in totals {
        let total: u64 = summary.iter().map(get).sum();
        lines.push(format!("- `{name}` total: `{total}`"));
    }
    lines.push(String::new());

    let mut missingness: Vec<&QaSummaryRow> = summary.iter().collect();
    missingness.sort_by(|a, b| {
        b.null_fraction
            .total_cmp(&a.null_fraction)
            .then_with(|| b.n_rows.cmp(&a.n_rows))
    });
    add_table(
        &mut lines,
        "Highest Missingness",
        &missingness,
        &[
            "level",
            "entity_id",
            "metric_key",
            "n_rows",
            "n_null",
            "null_fraction",
            "min_timestamp_utc",
            "max_timestamp_utc",
        ],
    );

    let mut gaps: Vec<&QaSummaryRow> = summary.iter().collect();
    gaps.sort_by(|a, b| {
        desc_opt(a.max_gap_seconds, b.max_gap_seconds).then_with(|| b.gap_count.cmp(&a.gap_count))
    });
    add_table(
        &mut lines,
        "Largest Gaps",
        &gaps,
        &[
            "level",
            "entity_id",
            "metric_key",
            "median_step_seconds",
            "max_gap_seconds",
            "gap_count",
        ],
    );

    let mut anomalies: Vec<&QaSummaryRow> = summary.iter().collect();
    anomalies.sort_by(|a, b| {
        b.anomaly_total()
            .cmp(&a.anomaly_total())
            .then_with(|| b.spike_count.cmp(&a.spike_count))
    });
    add_table(
        &mut lines,
        "Potential Anomalies",
        &anomalies,
        &[
            "level",
            "entity_id",
            "metric_key",
            "negative_count",
            "bounded_range_violations",
            "spike_count",
        ],
    );

    let mut duplicates: Vec<&QaSummaryRow> = summary.iter().filter(|r| r.duplicate_rows > 0).collect();
    duplicates.sort_by(|a, b| b.duplicate_rows.cmp(&a.duplicate_rows));
    add_table(
        &mut lines,
        "Duplicates",
        &duplicates,
        &["level", "entity_id", "metric_key", "duplicate_rows"],
    );

    lines.join("\n")
}
