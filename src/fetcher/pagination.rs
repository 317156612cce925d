//! Paged listing helpers for the metadata endpoints
//!
//! `/entities/query` is walked page by page until an empty or short page comes
//! back. `/datasources/` is a single request whose rows are normalised and
//! sorted.

use serde_json::{Map, Value};
use tracing::debug;

use crate::fetcher::{json_type_name, FetcherError, FetcherResult, IodaApi};
use crate::Datasource;

/// Maximum number of pages walked before giving up
const MAX_ITERATIONS: usize = 10_000;

/// Largest page the API serves
const MAX_PAGE_SIZE: usize = 100;

/// Page size used for a requested `limit`
pub fn page_size(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// Collect every entity row of `entity_type`
///
/// # Arguments
/// * `api` - API access
/// * `entity_type` - `country` or `region`
/// * `related_to` - Optional relation filter, e.g. `country/NG`
/// * `limit` - Requested limit, capped to the page size the API serves
///
/// # Errors
/// Propagates request errors; a `data` field that is not a list is an
/// [`FetcherError::InvalidResponse`]
pub async fn list_entities<A: IodaApi + ?Sized>(
    api: &A,
    entity_type: &str,
    related_to: Option<&str>,
    limit: usize,
) -> FetcherResult<Vec<Map<String, Value>>> {
    let size = page_size(limit);
    let mut rows = Vec::new();

    for page in 0..MAX_ITERATIONS {
        let payload = api.query_entities(entity_type, related_to, size, page).await?;
        let data = data_list(&payload, || format!("entities data for {entity_type}"))?;
        if data.is_empty() {
            return Ok(rows);
        }
        let count = data.len();
        rows.extend(data.iter().filter_map(|row| row.as_object().cloned()));
        debug!(entity_type, ?related_to, page, count, "Fetched entity page");
        if count < size {
            return Ok(rows);
        }
    }

    Err(FetcherError::InvalidResponse(format!(
        "Max pages ({MAX_ITERATIONS}) exceeded listing {entity_type} entities"
    )))
}

/// List every datasource, sorted by identifier
///
/// # Errors
/// Propagates request errors; a `data` field that is not a list is an
/// [`FetcherError::InvalidResponse`]
pub async fn list_datasources<A: IodaApi + ?Sized>(api: &A) -> FetcherResult<Vec<Datasource>> {
    let payload = api.datasources().await?;
    let data = data_list(&payload, || "datasources data".to_string())?;

    let mut datasources: Vec<Datasource> = data
        .iter()
        .filter_map(Value::as_object)
        .map(|row| Datasource {
            datasource: row
                .get("datasource")
                .map(value_to_string)
                .unwrap_or_default(),
            name: row.get("name").and_then(optional_string),
            units: row.get("units").and_then(optional_string),
        })
        .collect();
    datasources.sort_by(|a, b| a.datasource.cmp(&b.datasource));
    Ok(datasources)
}

/// `payload["data"]` as a list; missing or null counts as empty
fn data_list<'a>(
    payload: &'a Value,
    what: impl FnOnce() -> String,
) -> FetcherResult<&'a [Value]> {
    match payload.get("data") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(FetcherError::InvalidResponse(format!(
            "Unexpected {} shape: {}",
            what(),
            json_type_name(other)
        ))),
    }
}

/// Render a scalar the way it reads in the payload
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn optional_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(value_to_string(other)),
    }
}
