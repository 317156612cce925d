//! Signal payload inspection
//!
//! A `/signals/raw` body nests one or more series objects somewhere below its
//! `data` field. A series is any JSON map carrying all of
//! [`SERIES_REQUIRED_KEYS`]; its `values` array holds one observation per
//! `step` seconds starting at `from`.

use serde_json::{Map, Value};

/// Keys that identify a series object
pub const SERIES_REQUIRED_KEYS: [&str; 7] = [
    "entityType",
    "entityCode",
    "datasource",
    "from",
    "until",
    "step",
    "values",
];

/// Borrowed view over one series object
#[derive(Debug, Clone, Copy)]
pub struct Series<'a> {
    object: &'a Map<String, Value>,
}

impl<'a> Series<'a> {
    /// Wrap `object` if it carries every required key
    pub fn from_object(object: &'a Map<String, Value>) -> Option<Self> {
        SERIES_REQUIRED_KEYS
            .iter()
            .all(|key| object.contains_key(*key))
            .then_some(Self { object })
    }

    /// Raw field access
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.object.get(key)
    }

    /// `datasource` as text
    pub fn datasource(&self) -> String {
        self.text("datasource").unwrap_or_default()
    }

    /// Optional `subtype`
    pub fn subtype(&self) -> Option<String> {
        self.text("subtype").filter(|s| !s.is_empty())
    }

    /// First timestamp, epoch seconds
    pub fn from_ts(&self) -> i64 {
        self.get("from").and_then(as_i64).unwrap_or(0)
    }

    /// Seconds between observations
    pub fn step(&self) -> i64 {
        self.get("step").and_then(as_i64).unwrap_or(0)
    }

    /// Native resolution reported by the API
    pub fn native_step(&self) -> Option<i64> {
        self.get("nativeStep").and_then(as_i64)
    }

    /// Observations, empty when missing or not a list
    pub fn values(&self) -> &'a [Value] {
        match self.object.get("values") {
            Some(Value::Array(values)) => values.as_slice(),
            _ => &[],
        }
    }

    /// Timestamp of observation `index`
    pub fn timestamp_at(&self, index: usize) -> i64 {
        self.from_ts() + index as i64 * self.step()
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.object.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Every series object below `node`, depth first in document order.
///
/// A matching map is not searched further.
pub fn iter_series(node: &Value) -> Vec<Series<'_>> {
    let mut found = Vec::new();
    collect_series(node, &mut found);
    found
}

fn collect_series<'a>(node: &'a Value, found: &mut Vec<Series<'a>>) {
    match node {
        Value::Object(object) => match Series::from_object(object) {
            Some(series) => found.push(series),
            None => object.values().for_each(|v| collect_series(v, found)),
        },
        Value::Array(items) => items.iter().for_each(|v| collect_series(v, found)),
        _ => {}
    }
}

/// Whether a single observation counts as data.
///
/// Booleans and numbers are present; maps when non-empty; lists when any
/// element is present. Null, strings and empty containers are absent.
pub fn point_has_data(value: &Value) -> bool {
    match value {
        Value::Bool(_) | Value::Number(_) => true,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => items.iter().any(point_has_data),
        Value::Null | Value::String(_) => false,
    }
}

/// Whether any observation in `values` is present
pub fn values_have_data(values: &[Value]) -> bool {
    values.iter().any(point_has_data)
}

/// Whether any series below `payload["data"]` has a present observation
pub fn payload_has_data(payload: &Value) -> bool {
    payload
        .get("data")
        .map(|data| iter_series(data).iter().any(|s| values_have_data(s.values())))
        .unwrap_or(false)
}

/// Minimum and maximum timestamps with data across all series.
///
/// Series with a non-positive step are skipped.
pub fn payload_time_bounds(payload: &Value) -> (Option<i64>, Option<i64>) {
    let mut min_ts: Option<i64> = None;
    let mut max_ts: Option<i64> = None;
    let Some(data) = payload.get("data") else {
        return (None, None);
    };
    for series in iter_series(data) {
        if series.step() <= 0 {
            continue;
        }
        for (idx, value) in series.values().iter().enumerate() {
            if !point_has_data(value) {
                continue;
            }
            let ts = series.timestamp_at(idx);
            min_ts = Some(min_ts.map_or(ts, |m| m.min(ts)));
            max_ts = Some(max_ts.map_or(ts, |m| m.max(ts)));
        }
    }
    (min_ts, max_ts)
}

/// Integer view of a JSON scalar; floats truncate, numeric strings parse
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}
