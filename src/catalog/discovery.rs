//! End-to-end discovery run
//!
//! Lists countries and datasources, resolves the configured scope, optionally
//! lists regions and probes coverage, then writes the catalog CSV, its Markdown
//! report and a JSON snapshot of everything that was resolved.

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use super::entities::{discover_regions, limit_entities, resolve_target_countries, ENTITY_QUERY_LIMIT};
use super::report::render_catalog_markdown;
use super::{build_catalog, write_catalog, CatalogResult, CatalogRow};
use crate::config::PipelineConfig;
use crate::coverage::{
    discover_coverage, CoverageError, CoverageProber, CoverageRow, JsonFileCoverageStore,
};
use crate::fetcher::{list_datasources, list_entities, IodaApi};
use crate::output::{write_json, write_text};
use crate::{isoformat_utc, Datasource, Entity};

/// Switches and output locations for a discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// List regions of every resolved country
    pub include_regions: bool,
    /// Probe coverage for every entity × metric pair
    pub probe_coverage: bool,
    /// Metrics to probe; `None` probes every datasource
    pub metrics: Option<Vec<String>>,
    /// Keep only the first N countries (and their regions)
    pub limit_entities: Option<usize>,
    /// Ignore cached coverage
    pub refresh_coverage: bool,
    /// Catalog CSV
    pub catalog_path: PathBuf,
    /// Markdown report
    pub markdown_path: PathBuf,
    /// JSON snapshot
    pub snapshot_path: PathBuf,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include_regions: true,
            probe_coverage: true,
            metrics: None,
            limit_entities: None,
            refresh_coverage: false,
            catalog_path: PathBuf::from("data/processed/entity_catalog.csv"),
            markdown_path: PathBuf::from("docs/entity_catalog.md"),
            snapshot_path: PathBuf::from("data/intermediate/discovery_snapshot.json"),
        }
    }
}

/// Everything a discovery run resolved
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutput {
    /// When the run finished
    pub generated_at_utc: String,
    /// Datasources, sorted
    pub datasources: Vec<Datasource>,
    /// Resolved countries, sorted by code
    pub countries: Vec<Entity>,
    /// Regions, sorted by (parent, code)
    pub regions: Vec<Entity>,
    /// Coverage rows in probe order
    pub coverage: Vec<CoverageRow>,
    /// Catalog rows
    #[serde(skip)]
    pub catalog: Vec<CatalogRow>,
}

/// Metrics to probe: the requested subset (sorted, de-duplicated) or all
fn metric_list(datasources: &[Datasource], requested: Option<&[String]>) -> Vec<String> {
    match requested {
        Some(metrics) if !metrics.is_empty() => {
            let mut metrics = metrics.to_vec();
            metrics.sort();
            metrics.dedup();
            metrics
        }
        _ => datasources.iter().map(|d| d.datasource.clone()).collect(),
    }
}

/// Run discovery and write its outputs
///
/// # Errors
/// Missing configured countries are reported before any probe runs.
pub async fn run_discovery<A: IodaApi + ?Sized>(
    api: &A,
    config: &PipelineConfig,
    options: &DiscoveryOptions,
    now: Option<DateTime<Utc>>,
    progress: Option<&ProgressBar>,
) -> CatalogResult<DiscoveryOutput> {
    let all_countries = list_entities(api, "country", None, ENTITY_QUERY_LIMIT).await?;
    let datasources = list_datasources(api).await?;
    info!(
        remote_countries = all_countries.len(),
        datasources = datasources.len(),
        "Fetched metadata"
    );

    let mut countries = resolve_target_countries(&config.requested_countries(), &all_countries)?;
    if let Some(limit) = options.limit_entities {
        countries.truncate(limit);
    }
    let mut regions = if options.include_regions {
        discover_regions(api, &countries).await?
    } else {
        Vec::new()
    };
    if let Some(limit) = options.limit_entities {
        limit_entities(&mut countries, &mut regions, limit);
    }

    let coverage = if options.probe_coverage {
        let metrics = metric_list(&datasources, options.metrics.as_deref());
        let entities: Vec<Entity> = countries.iter().chain(&regions).cloned().collect();
        let mut store = JsonFileCoverageStore::open(&config.discovery.coverage_cache_path)
            .map_err(CoverageError::from)?;
        let prober = CoverageProber::new(api)
            .with_recent_days(config.discovery.recent_days_check)
            .with_floor_year(config.discovery.earliest_search_floor_year);
        if let Some(pb) = progress {
            pb.set_length((entities.len() * metrics.len()) as u64);
        }
        info!(
            entities = entities.len(),
            metrics = metrics.len(),
            refresh = options.refresh_coverage,
            "Discovering coverage"
        );
        discover_coverage(
            &prober,
            &mut store,
            &entities,
            &metrics,
            options.refresh_coverage,
            progress,
        )
        .await?
    } else {
        Vec::new()
    };

    let catalog = build_catalog(&countries, &regions, &datasources, &coverage);
    let generated_at = now.unwrap_or_else(Utc::now);

    write_catalog(&options.catalog_path, &catalog)?;
    write_text(
        &options.markdown_path,
        &render_catalog_markdown(&countries, &regions, &datasources, &catalog, generated_at),
    )?;

    let output = DiscoveryOutput {
        generated_at_utc: isoformat_utc(generated_at),
        datasources,
        countries,
        regions,
        coverage,
        catalog,
    };
    write_json(&options.snapshot_path, &output)?;

    info!(rows = output.catalog.len(), "Discovery complete");
    Ok(output)
}
