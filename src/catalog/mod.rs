//! Entity × metric catalog
//!
//! The catalog is the hand-off between discovery and fetching: one row per
//! resolved entity and advertised datasource, carrying coverage bounds when
//! they were probed.
//!
//! - [`entities`] - Country resolution and region discovery
//! - [`report`] - Markdown rendering
//! - [`discovery`] - End-to-end discovery run

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub mod discovery;
pub mod entities;
pub mod report;

pub use discovery::{run_discovery, DiscoveryOptions, DiscoveryOutput};
pub use entities::{discover_regions, limit_entities, resolve_target_countries};

use crate::coverage::{CoverageError, CoverageRow, CoverageSource, CoverageStatus, ProbeMethod};
use crate::fetcher::FetcherError;
use crate::output::csv::{read_records, write_records};
use crate::output::OutputError;
use crate::{epoch_to_utc_string, Datasource, Entity, EntityType};

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Enabled requested countries absent from remote metadata
    #[error("Requested country codes not found in IODA metadata: {0:?}")]
    MissingCountries(Vec<String>),

    /// Metadata request failed
    #[error(transparent)]
    Fetcher(#[from] FetcherError),

    /// Coverage discovery failed
    #[error(transparent)]
    Coverage(#[from] CoverageError),

    /// Catalog or report could not be written or read
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Column order of `entity_catalog.csv`
pub const CATALOG_COLUMNS: [&str; 20] = [
    "level",
    "entity_type",
    "entity_id",
    "entity_code",
    "entity_name",
    "iso2",
    "parent_country_id",
    "parent_country_name",
    "attrs_json",
    "metric",
    "metric_name",
    "unit",
    "coverage_min_ts",
    "coverage_max_ts",
    "coverage_min_utc",
    "coverage_max_utc",
    "coverage_status",
    "coverage_method",
    "coverage_checked_at_utc",
    "coverage_source",
];

/// One entity × metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    /// Output level
    pub level: EntityType,
    /// Entity kind
    pub entity_type: EntityType,
    /// Entity code
    pub entity_id: String,
    /// Entity code as queried
    pub entity_code: String,
    /// Remote display name
    pub entity_name: Option<String>,
    /// ISO2 code, countries only
    pub iso2: Option<String>,
    /// Parent country, regions only
    pub parent_country_id: Option<String>,
    /// Parent country name, regions only
    pub parent_country_name: Option<String>,
    /// Remote attributes as JSON with sorted keys
    pub attrs_json: String,
    /// Datasource
    pub metric: String,
    /// Datasource display name
    pub metric_name: Option<String>,
    /// Datasource units
    pub unit: Option<String>,
    /// Earliest data, epoch seconds
    pub coverage_min_ts: Option<i64>,
    /// Latest data, epoch seconds
    pub coverage_max_ts: Option<i64>,
    /// Earliest data, UTC
    pub coverage_min_utc: Option<String>,
    /// Latest data, UTC
    pub coverage_max_utc: Option<String>,
    /// Probe outcome
    pub coverage_status: Option<CoverageStatus>,
    /// Producing stage
    pub coverage_method: Option<ProbeMethod>,
    /// When coverage was checked
    pub coverage_checked_at_utc: Option<String>,
    /// Cache hit or fresh probe
    pub coverage_source: Option<CoverageSource>,
}

impl CatalogRow {
    /// Row with only the key columns filled
    pub fn empty(level: EntityType, entity_id: &str, metric: &str) -> Self {
        Self {
            level,
            entity_type: level,
            entity_id: entity_id.to_string(),
            entity_code: entity_id.to_string(),
            entity_name: None,
            iso2: None,
            parent_country_id: None,
            parent_country_name: None,
            attrs_json: "{}".to_string(),
            metric: metric.to_string(),
            metric_name: None,
            unit: None,
            coverage_min_ts: None,
            coverage_max_ts: None,
            coverage_min_utc: None,
            coverage_max_utc: None,
            coverage_status: None,
            coverage_method: None,
            coverage_checked_at_utc: None,
            coverage_source: None,
        }
    }
}

/// Cross join entities with every datasource and attach coverage.
///
/// Sorted by (level, entity_id, metric).
pub fn build_catalog(
    countries: &[Entity],
    regions: &[Entity],
    datasources: &[Datasource],
    coverage: &[CoverageRow],
) -> Vec<CatalogRow> {
    let coverage_index: HashMap<(EntityType, &str, &str), &CoverageRow> = coverage
        .iter()
        .map(|row| ((row.entity_type, row.entity_id.as_str(), row.metric.as_str()), row))
        .collect();

    let mut rows = Vec::with_capacity((countries.len() + regions.len()) * datasources.len());
    for entity in countries.iter().chain(regions) {
        let sorted_attrs: BTreeMap<&String, &serde_json::Value> = entity.attrs.iter().collect();
        let attrs_json = serde_json::to_string(&sorted_attrs).unwrap_or_else(|_| "{}".to_string());
        for ds in datasources {
            let cov = coverage_index
                .get(&(entity.entity_type, entity.code.as_str(), ds.datasource.as_str()))
                .copied();
            let min_ts = cov.and_then(|c| c.coverage_min_ts);
            let max_ts = cov.and_then(|c| c.coverage_max_ts);
            rows.push(CatalogRow {
                level: entity.entity_type,
                entity_type: entity.entity_type,
                entity_id: entity.code.clone(),
                entity_code: entity.code.clone(),
                entity_name: entity.name.clone(),
                iso2: entity.iso2.clone(),
                parent_country_id: entity.parent_country_id.clone(),
                parent_country_name: entity.parent_country_name.clone(),
                attrs_json: attrs_json.clone(),
                metric: ds.datasource.clone(),
                metric_name: ds.name.clone(),
                unit: ds.units.clone(),
                coverage_min_ts: min_ts,
                coverage_max_ts: max_ts,
                coverage_min_utc: min_ts.and_then(epoch_to_utc_string),
                coverage_max_utc: max_ts.and_then(epoch_to_utc_string),
                coverage_status: cov.map(|c| c.coverage_status),
                coverage_method: cov.map(|c| c.coverage_method),
                coverage_checked_at_utc: cov.map(|c| c.coverage_checked_at_utc.clone()),
                coverage_source: cov.map(|c| c.coverage_source),
            });
        }
    }
    rows.sort_by(|a, b| {
        (a.level, &a.entity_id, &a.metric).cmp(&(b.level, &b.entity_id, &b.metric))
    });
    rows
}

/// Write the catalog CSV
pub fn write_catalog(path: &Path, rows: &[CatalogRow]) -> CatalogResult<()> {
    write_records(path, &CATALOG_COLUMNS, rows)?;
    Ok(())
}

/// Read the catalog CSV
pub fn load_catalog(path: &Path) -> CatalogResult<Vec<CatalogRow>> {
    Ok(read_records(path)?)
}
