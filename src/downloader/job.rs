//! Fetch targets, run counters and target selection

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::CatalogRow;
use crate::{EntityType, LevelFilter};

/// One entity × metric pair to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTarget {
    /// Entity kind, also the output level
    pub entity_type: EntityType,
    /// Entity code
    pub entity_id: String,
    /// Display name, falls back to the code
    pub entity_name: String,
    /// Parent country, regions only
    pub parent_country_id: Option<String>,
    /// Datasource
    pub metric: String,
    /// Unit from the datasource listing
    pub unit: Option<String>,
    /// Earliest known data, epoch seconds
    pub coverage_min_ts: Option<i64>,
    /// Latest known data, epoch seconds
    pub coverage_max_ts: Option<i64>,
}

impl FetchTarget {
    /// Target without coverage or metadata
    pub fn new(entity_type: EntityType, entity_id: &str, metric: &str) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
            entity_name: entity_id.to_string(),
            parent_country_id: None,
            metric: metric.to_string(),
            unit: None,
            coverage_min_ts: None,
            coverage_max_ts: None,
        }
    }

    /// Output level; identical to the entity type
    pub fn level(&self) -> EntityType {
        self.entity_type
    }

    /// `level/entity/metric`, for logs
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.entity_type, self.entity_id, self.metric)
    }

    fn from_catalog(row: &CatalogRow) -> Self {
        let entity_name = row
            .entity_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&row.entity_id)
            .to_string();
        Self {
            entity_type: row.level,
            entity_id: row.entity_id.clone(),
            entity_name,
            parent_country_id: row.parent_country_id.clone(),
            metric: row.metric.clone(),
            unit: row.unit.clone(),
            coverage_min_ts: row.coverage_min_ts,
            coverage_max_ts: row.coverage_max_ts,
        }
    }
}

/// Counters for one fetch run. They only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    /// Targets selected for the run, set before any fetch
    pub targets: u64,
    /// Chunks visited, at any granularity
    pub planned_chunks: u64,
    /// Bodies written
    pub written_chunks: u64,
    /// Chunks already on disk
    pub skipped_existing: u64,
    /// Chunks only planned
    pub dry_run_chunks: u64,
    /// Unrecovered failures
    pub errors: u64,
}

impl std::fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "targets={} planned_chunks={} written_chunks={} skipped_existing={} dry_run_chunks={} errors={}",
            self.targets,
            self.planned_chunks,
            self.written_chunks,
            self.skipped_existing,
            self.dry_run_chunks,
            self.errors
        )
    }
}

/// Pick fetch targets out of the catalog.
///
/// Rows are filtered by level and metric, de-duplicated on
/// (level, entity, metric) and sorted by the same key. `limit_entities`
/// keeps the first N entities of each level.
pub fn select_targets(
    catalog: &[CatalogRow],
    level: LevelFilter,
    metrics: Option<&[String]>,
    limit_entities: Option<usize>,
) -> Vec<FetchTarget> {
    let mut selected: BTreeMap<(EntityType, String, String), &CatalogRow> = BTreeMap::new();
    for row in catalog {
        if !level.matches(row.level) {
            continue;
        }
        if let Some(metrics) = metrics {
            if !metrics.iter().any(|m| m == &row.metric) {
                continue;
            }
        }
        selected
            .entry((row.level, row.entity_id.clone(), row.metric.clone()))
            .or_insert(row);
    }

    let allowed: Option<BTreeSet<(EntityType, String)>> = limit_entities.map(|n| {
        let entities: BTreeSet<(EntityType, String)> = selected
            .keys()
            .map(|(level, entity, _)| (*level, entity.clone()))
            .collect();
        let mut per_level: BTreeMap<EntityType, usize> = BTreeMap::new();
        entities
            .into_iter()
            .filter(|(level, _)| {
                let count = per_level.entry(*level).or_insert(0);
                *count += 1;
                *count <= n
            })
            .collect()
    });

    selected
        .into_iter()
        .filter(|((level, entity, _), _)| {
            allowed
                .as_ref()
                .map_or(true, |set| set.contains(&(*level, entity.clone())))
        })
        .map(|(_, row)| FetchTarget::from_catalog(row))
        .collect()
}

/// Split a `--metrics` argument; empty or `auto` means every metric
pub fn parse_metrics_arg(arg: Option<&str>) -> Option<Vec<String>> {
    let arg = arg?.trim();
    if arg.is_empty() || arg == "auto" {
        return None;
    }
    let metrics: Vec<String> = arg
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if metrics.is_empty() {
        None
    } else {
        Some(metrics)
    }
}
