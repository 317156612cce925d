//! Raw archive → long table
//!
//! Every observation of every series in every raw file becomes one or more
//! rows. Scalar observations map to one row; nested observations (lists of
//! items, maps of numeric fields, `agg_values` maps) fan out into one row per
//! numeric field, with the remaining scalar fields folded into a
//! `series_variant` label.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use super::{TransformError, TransformResult};
use crate::catalog::CatalogRow;
use crate::coverage::payload::iter_series;
use crate::fetcher::pagination::optional_string;
use crate::output::path::{collect_raw_files, parse_window_from_filename, sanitize_component};

/// Column order of `ioda_long.csv`
pub const LONG_COLUMNS: [&str; 20] = [
    "timestamp_utc",
    "level",
    "entity_type",
    "entity_id",
    "entity_name",
    "parent_country_id",
    "parent_country_name",
    "datasource",
    "subtype",
    "metric",
    "series_variant",
    "value",
    "unit",
    "source_fields_json",
    "step_seconds",
    "native_step_seconds",
    "raw_file",
    "raw_window_start_ts",
    "raw_window_end_ts",
    "duplicate_key_count",
];

/// One observation of one metric variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
    /// Observation time
    pub timestamp_utc: DateTime<Utc>,
    /// `country`, `region`, or the raw entity type
    pub level: String,
    /// Entity type as reported by the series
    pub entity_type: String,
    /// Entity code
    pub entity_id: String,
    /// Entity name from the series, else the catalog
    pub entity_name: Option<String>,
    /// Parent country from the catalog
    pub parent_country_id: Option<String>,
    /// Parent country name from the catalog
    pub parent_country_name: Option<String>,
    /// Datasource of the series
    pub datasource: String,
    /// Series subtype, may be empty
    pub subtype: String,
    /// Derived metric name
    pub metric: String,
    /// Variant label, empty for scalar observations
    pub series_variant: String,
    /// Numeric value
    pub value: Option<f64>,
    /// Unit from the catalog (metric, then datasource)
    pub unit: Option<String>,
    /// Non-numeric fields of the observation as sorted JSON
    pub source_fields_json: String,
    /// Series step in seconds
    pub step_seconds: i64,
    /// Native step in seconds, 0 when absent
    pub native_step_seconds: i64,
    /// Raw file the row came from
    pub raw_file: String,
    /// Raw window start parsed from the file name
    pub raw_window_start_ts: Option<i64>,
    /// Raw window end parsed from the file name
    pub raw_window_end_ts: Option<i64>,
    /// Rows that shared this row's key before de-duplication
    pub duplicate_key_count: u32,
}

impl LongRow {
    /// Key that must be unique in the output table
    fn dedupe_key(&self) -> (DateTime<Utc>, &str, &str, &str, &str) {
        (
            self.timestamp_utc,
            &self.level,
            &self.entity_id,
            &self.metric,
            &self.series_variant,
        )
    }
}

/// Expansion of one observation, before series context is attached
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedValue {
    /// Derived metric name
    pub metric: String,
    /// Numeric value
    pub value: Option<f64>,
    /// Variant label
    pub series_variant: String,
    /// Non-numeric fields as sorted JSON
    pub source_fields_json: String,
}

impl ExpandedValue {
    fn new(metric: String, value: Option<f64>, variant: String, source_fields_json: String) -> Self {
        Self {
            metric,
            value,
            series_variant: variant,
            source_fields_json,
        }
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Number(_))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn stable_json(fields: &BTreeMap<&str, &Value>) -> String {
    if fields.is_empty() {
        return "{}".to_string();
    }
    serde_json::to_string(fields).unwrap_or_else(|_| "{}".to_string())
}

fn raw_type_json(value: &Value) -> String {
    let mut fields = BTreeMap::new();
    let kind = Value::String(json_kind(value).to_string());
    fields.insert("raw_type", &kind);
    stable_json(&fields)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Variant label for the scalar dims of an item.
///
/// Nested dims are ignored. With no scalar dims and an index, the label is
/// `item=<index>`.
pub fn dims_to_variant(dims: &BTreeMap<&str, &Value>, item_index: Option<usize>) -> String {
    let parts: Vec<String> = dims
        .iter()
        .filter(|(_, v)| !matches!(v, Value::Object(_) | Value::Array(_)))
        .map(|(k, v)| format!("{}={}", sanitize_component(k), sanitize_component(&scalar_text(v))))
        .collect();
    match (parts.is_empty(), item_index) {
        (true, Some(idx)) => format!("item={idx}"),
        _ => parts.join("__"),
    }
}

/// Metric name prefix of a series: the datasource, plus the sanitized subtype
pub fn metric_base(datasource: &str, subtype: Option<&str>) -> String {
    match subtype.map(str::trim).filter(|s| !s.is_empty()) {
        Some(subtype) => format!("{datasource}__{}", sanitize_component(subtype)),
        None => datasource.to_string(),
    }
}

fn expand_item(item: &Value, base: &str, index: usize) -> Vec<ExpandedValue> {
    let item_variant = format!("item={index}");
    let object = match item {
        Value::Null => {
            return vec![ExpandedValue::new(base.to_string(), None, item_variant, "{}".into())];
        }
        Value::Number(n) => {
            return vec![ExpandedValue::new(
                format!("{base}__item"),
                n.as_f64(),
                item_variant,
                "{}".into(),
            )];
        }
        Value::Object(object) => object,
        other => {
            return vec![ExpandedValue::new(
                base.to_string(),
                None,
                item_variant,
                raw_type_json(other),
            )];
        }
    };

    if let Some(Value::Object(agg_values)) = object.get("agg_values") {
        return expand_agg_values(object, agg_values, base, index);
    }

    let (numeric, dims): (BTreeMap<&str, &Value>, BTreeMap<&str, &Value>) = object
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .partition(|(_, v)| v.is_null() || is_number(v));
    let variant = dims_to_variant(&dims, Some(index));
    let source_fields = stable_json(&dims);
    if numeric.is_empty() {
        return vec![ExpandedValue::new(base.to_string(), None, variant, source_fields)];
    }
    numeric
        .into_iter()
        .map(|(key, v)| {
            ExpandedValue::new(
                format!("{base}__{}", sanitize_component(key)),
                v.as_f64(),
                variant.clone(),
                source_fields.clone(),
            )
        })
        .collect()
}

fn expand_agg_values(
    object: &Map<String, Value>,
    agg_values: &Map<String, Value>,
    base: &str,
    index: usize,
) -> Vec<ExpandedValue> {
    let dims: BTreeMap<&str, &Value> = object
        .iter()
        .filter(|(k, _)| k.as_str() != "agg_values")
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    let variant = dims_to_variant(&dims, Some(index));
    let source_fields = stable_json(&dims);

    let sorted: BTreeMap<&str, &Value> = agg_values.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let rows: Vec<ExpandedValue> = sorted
        .into_iter()
        .filter(|(_, v)| v.is_null() || is_number(v))
        .map(|(key, v)| {
            ExpandedValue::new(
                format!("{base}__{}", sanitize_component(key)),
                v.as_f64(),
                variant.clone(),
                source_fields.clone(),
            )
        })
        .collect();
    if rows.is_empty() {
        vec![ExpandedValue::new(base.to_string(), None, variant, source_fields)]
    } else {
        rows
    }
}

/// Expand one observation into rows.
///
/// * null → one null row
/// * number → one row
/// * list → one expansion per item (`item=<i>` variants); empty list → null row
/// * map → expanded as item 0
/// * anything else → one null row recording the raw type
pub fn expand_value(value: &Value, base: &str) -> Vec<ExpandedValue> {
    let scalar = |v: Option<f64>, fields: String| {
        vec![ExpandedValue::new(base.to_string(), v, String::new(), fields)]
    };
    match value {
        Value::Null => scalar(None, "{}".into()),
        Value::Number(n) => scalar(n.as_f64(), "{}".into()),
        Value::Array(items) if items.is_empty() => scalar(None, "{}".into()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| expand_item(item, base, idx))
            .collect(),
        Value::Object(_) => expand_item(value, base, 0),
        other => scalar(None, raw_type_json(other)),
    }
}

/// Rows of one parsed raw file, without catalog metadata
pub fn rows_from_payload(payload: &Value, raw_file: &Path) -> Vec<LongRow> {
    let Some(data) = payload.get("data") else {
        return Vec::new();
    };
    let window = parse_window_from_filename(raw_file);
    let raw_file = raw_file.display().to_string();
    let mut rows = Vec::new();

    for series in iter_series(data) {
        let step = series.step();
        if step <= 0 {
            continue;
        }
        let datasource = series
            .get("datasource")
            .and_then(optional_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let subtype = series.subtype().map(|s| s.trim().to_string()).unwrap_or_default();
        let base = metric_base(&datasource, Some(&subtype));
        let entity_type = series
            .get("entityType")
            .and_then(optional_string)
            .unwrap_or_default();
        let entity_id = series
            .get("entityCode")
            .and_then(optional_string)
            .unwrap_or_default();
        let entity_name = series.get("entityName").and_then(optional_string);
        let native_step = series.native_step().unwrap_or(0);

        for (idx, value) in series.values().iter().enumerate() {
            let Some(timestamp) = Utc.timestamp_opt(series.timestamp_at(idx), 0).single() else {
                continue;
            };
            for expanded in expand_value(value, &base) {
                rows.push(LongRow {
                    timestamp_utc: timestamp,
                    level: entity_type.clone(),
                    entity_type: entity_type.clone(),
                    entity_id: entity_id.clone(),
                    entity_name: entity_name.clone(),
                    parent_country_id: None,
                    parent_country_name: None,
                    datasource: datasource.clone(),
                    subtype: subtype.clone(),
                    metric: expanded.metric,
                    series_variant: expanded.series_variant,
                    value: expanded.value,
                    unit: None,
                    source_fields_json: expanded.source_fields_json,
                    step_seconds: step,
                    native_step_seconds: native_step,
                    raw_file: raw_file.clone(),
                    raw_window_start_ts: window.map(|w| w.0),
                    raw_window_end_ts: window.map(|w| w.1),
                    duplicate_key_count: 1,
                });
            }
        }
    }
    rows
}

/// Entity metadata and units looked up from the catalog
struct CatalogLookup<'a> {
    entities: HashMap<(&'a str, &'a str), &'a CatalogRow>,
    units: HashMap<&'a str, Option<&'a str>>,
}

impl<'a> CatalogLookup<'a> {
    fn new(catalog: &'a [CatalogRow]) -> Self {
        let mut entities = HashMap::new();
        let mut units = HashMap::new();
        for row in catalog {
            entities
                .entry((row.level.as_str(), row.entity_id.as_str()))
                .or_insert(row);
            units
                .entry(row.metric.as_str())
                .or_insert(row.unit.as_deref());
        }
        Self { entities, units }
    }

    fn unit(&self, metric: &str, datasource: &str) -> Option<String> {
        self.units
            .get(metric)
            .copied()
            .flatten()
            .or_else(|| self.units.get(datasource).copied().flatten())
            .map(str::to_string)
    }

    fn apply(&self, row: &mut LongRow) {
        if let Some(meta) = self.entities.get(&(row.level.as_str(), row.entity_id.as_str())) {
            if row.entity_name.is_none() {
                row.entity_name = meta.entity_name.clone();
            }
            if row.parent_country_id.is_none() {
                row.parent_country_id = meta.parent_country_id.clone();
            }
            if row.parent_country_name.is_none() {
                row.parent_country_name = meta.parent_country_name.clone();
            }
        }
        row.unit = self.unit(&row.metric, &row.datasource);
    }
}

/// Remove exact duplicates, then keep the first row per key.
///
/// Rows sharing (timestamp, level, entity, metric, variant) are ordered by
/// source fields, raw file and steps; the first survives and records how many
/// shared its key. The result is sorted by (level, entity, metric, variant,
/// timestamp).
pub fn dedupe_rows(rows: Vec<LongRow>) -> Vec<LongRow> {
    let mut seen = HashSet::new();
    let mut rows: Vec<LongRow> = rows
        .into_iter()
        .filter(|row| seen.insert(format!("{row:?}")))
        .collect();

    rows.sort_by(|a, b| {
        a.dedupe_key()
            .cmp(&b.dedupe_key())
            .then_with(|| a.source_fields_json.cmp(&b.source_fields_json))
            .then_with(|| a.raw_file.cmp(&b.raw_file))
            .then_with(|| a.step_seconds.cmp(&b.step_seconds))
            .then_with(|| a.native_step_seconds.cmp(&b.native_step_seconds))
    });

    let total = rows.len();
    let mut out: Vec<LongRow> = Vec::with_capacity(total);
    for row in rows {
        match out.last_mut() {
            Some(last) if last.dedupe_key() == row.dedupe_key() => {
                last.duplicate_key_count += 1;
            }
            _ => out.push(row),
        }
    }
    debug!(rows = total, kept = out.len(), "De-duplicated long rows");

    out.sort_by(|a, b| {
        (&a.level, &a.entity_id, &a.metric, &a.series_variant, a.timestamp_utc).cmp(&(
            &b.level,
            &b.entity_id,
            &b.metric,
            &b.series_variant,
            b.timestamp_utc,
        ))
    });
    out
}

/// Build the long table from every raw file below `raw_dir`
///
/// # Errors
/// Unreadable directories or files, and files that are not JSON
pub fn build_long_table(raw_dir: &Path, catalog: &[CatalogRow]) -> TransformResult<Vec<LongRow>> {
    let files = collect_raw_files(raw_dir)
        .map_err(|e| TransformError::Io(format!("Failed to list {}: {e}", raw_dir.display())))?;
    info!(files = files.len(), raw_dir = %raw_dir.display(), "Building long table");

    let mut rows = Vec::new();
    for path in &files {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TransformError::Io(format!("Failed to read {}: {e}", path.display())))?;
        let payload: Value = serde_json::from_str(&text).map_err(|e| TransformError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        rows.extend(rows_from_payload(&payload, path));
    }

    let lookup = CatalogLookup::new(catalog);
    for row in rows.iter_mut() {
        lookup.apply(row);
    }

    let rows = dedupe_rows(rows);
    info!(rows = rows.len(), "Long table built");
    Ok(rows)
}
