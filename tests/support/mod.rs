//! Stub API and payload builders shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ioda_pipeline::fetcher::{FetcherResult, IodaApi, RawResponse, SignalsQuery};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

type SignalsFn = Box<dyn Fn(&SignalsQuery) -> FetcherResult<RawResponse> + Send + Sync>;

/// In-process [`IodaApi`] with canned metadata and a scripted signals endpoint
pub struct StubApi {
    countries: Vec<Value>,
    regions: HashMap<String, Vec<Value>>,
    datasources: Vec<Value>,
    signals: SignalsFn,
    calls: Mutex<Vec<SignalsQuery>>,
}

impl StubApi {
    pub fn new(
        signals: impl Fn(&SignalsQuery) -> FetcherResult<RawResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            countries: Vec::new(),
            regions: HashMap::new(),
            datasources: Vec::new(),
            signals: Box::new(signals),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every signals request answers with one small series
    pub fn always_small() -> Self {
        Self::new(|q| Ok(small_response(q)))
    }

    pub fn with_countries(mut self, codes: &[(&str, &str)]) -> Self {
        self.countries = codes
            .iter()
            .map(|(code, name)| json!({"code": code, "name": name, "type": "country", "attrs": {"fqid": format!("geo.{code}")}}))
            .collect();
        self
    }

    pub fn with_regions(mut self, country: &str, regions: &[(&str, &str)]) -> Self {
        let rows = regions
            .iter()
            .map(|(code, name)| {
                json!({
                    "code": code,
                    "name": name,
                    "type": "region",
                    "attrs": {"country_code": country, "country_name": format!("{country} name")}
                })
            })
            .collect();
        self.regions.insert(format!("country/{country}"), rows);
        self
    }

    pub fn with_datasources(mut self, ids: &[(&str, &str)]) -> Self {
        self.datasources = ids
            .iter()
            .map(|(id, units)| json!({"datasource": id, "name": format!("{id} signal"), "units": units}))
            .collect();
        self
    }

    /// Signals requests seen so far
    pub fn signal_calls(&self) -> Vec<SignalsQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn signal_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl IodaApi for StubApi {
    async fn query_entities(
        &self,
        entity_type: &str,
        related_to: Option<&str>,
        limit: usize,
        page: usize,
    ) -> FetcherResult<Value> {
        let rows: &[Value] = match (entity_type, related_to) {
            ("country", None) => &self.countries,
            ("region", Some(rel)) => self.regions.get(rel).map(Vec::as_slice).unwrap_or(&[]),
            _ => &[],
        };
        let page_rows: Vec<Value> = rows.iter().skip(page * limit).take(limit).cloned().collect();
        Ok(json!({ "data": page_rows }))
    }

    async fn datasources(&self) -> FetcherResult<Value> {
        Ok(json!({ "data": self.datasources }))
    }

    async fn signals_raw(&self, query: &SignalsQuery) -> FetcherResult<RawResponse> {
        self.calls.lock().unwrap().push(query.clone());
        (self.signals)(query)
    }
}

/// `/signals/raw` body holding one series
pub fn series_payload(query: &SignalsQuery, from: i64, step: i64, values: Vec<Value>) -> Value {
    json!({
        "type": "signals",
        "error": null,
        "data": [[{
            "entityType": query.entity_type,
            "entityCode": query.entity_code,
            "entityName": format!("{} name", query.entity_code),
            "datasource": query.datasource.clone().unwrap_or_default(),
            "subtype": "",
            "from": from,
            "until": from + step * values.len() as i64,
            "step": step,
            "nativeStep": step,
            "values": values,
        }]]
    })
}

/// Two hourly points at the start of the requested window
pub fn small_response(query: &SignalsQuery) -> RawResponse {
    let payload = series_payload(query, query.from, 3600, vec![json!(10.0), json!(12.5)]);
    RawResponse::from_json(format!("stub://signals/{}", query.entity_code), payload)
}

/// Response for a pair whose data spans `[data_start, data_end)`
pub fn interval_response(query: &SignalsQuery, data_start: i64, data_end: i64) -> RawResponse {
    intervals_response(query, &[(data_start, data_end)])
}

/// Response for a pair with data in each `[start, end)` of `spans`.
///
/// An overlapping query gets a series with points at the first and last
/// second of data inside it; anything else gets a series of nulls.
pub fn intervals_response(query: &SignalsQuery, spans: &[(i64, i64)]) -> RawResponse {
    let overlaps: Vec<(i64, i64)> = spans
        .iter()
        .map(|&(start, end)| (query.from.max(start), query.until.min(end)))
        .filter(|(lo, hi)| lo < hi)
        .collect();
    let payload = match (overlaps.iter().map(|o| o.0).min(), overlaps.iter().map(|o| o.1).max()) {
        (Some(first), Some(end)) => {
            let last = end - 1;
            if last == first {
                series_payload(query, first, 1, vec![json!(1)])
            } else {
                series_payload(query, first, last - first, vec![json!(1), json!(1)])
            }
        }
        _ => series_payload(query, query.from, 300, vec![Value::Null, Value::Null]),
    };
    RawResponse::from_json("stub://coverage", payload)
}

/// Catalog TOML scoped to the given countries, with the cache under `cache_path`
pub fn scoped_config_toml(countries: &[(&str, &str)], cache_path: &std::path::Path) -> String {
    let mut toml = String::from("[region_definition]\nname = \"Test\"\n\n");
    for (code, name) in countries {
        toml.push_str(&format!(
            "[[region_definition.countries]]\niso2 = \"{code}\"\nname = \"{name}\"\n\n"
        ));
    }
    toml.push_str(&format!(
        "[discovery]\ncoverage_cache_path = {:?}\nrecent_days_check = 30\nearliest_search_floor_year = 2024\n",
        cache_path.display().to_string()
    ));
    toml
}
