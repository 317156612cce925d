//! Integration tests for coverage discovery and the entity catalog

use chrono::{TimeZone, Utc};
use ioda_pipeline::catalog::discovery::{run_discovery, DiscoveryOptions};
use ioda_pipeline::catalog::{load_catalog, CatalogError};
use ioda_pipeline::config::PipelineConfig;
use ioda_pipeline::coverage::{
    discover_coverage, CoverageProber, CoverageResult, CoverageSource, CoverageStatus,
    CoverageStore, JsonFileCoverageStore, MemoryCoverageStore, ProbeMethod,
};
use ioda_pipeline::{CoverageKey, Entity, EntityType};
use tempfile::TempDir;

use crate::support::{interval_response, scoped_config_toml, StubApi};

const JAN_01_2025: i64 = 1_735_689_600;

fn country(code: &str) -> Entity {
    Entity {
        entity_type: EntityType::Country,
        code: code.to_string(),
        name: Some(format!("{code} name")),
        iso2: Some(code.to_string()),
        parent_country_id: None,
        parent_country_name: None,
        attrs: Default::default(),
        config_name: None,
    }
}

fn cached(earliest: i64, latest: i64) -> CoverageResult {
    CoverageResult {
        earliest_ts: Some(earliest),
        latest_ts: Some(latest),
        status: CoverageStatus::Ok,
        method: ProbeMethod::YearMonthDay,
        checked_at_utc: "2026-10-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn test_cache_hit_skips_prober() {
    let api = StubApi::new(|q| Ok(interval_response(q, JAN_01_2025, i64::MAX)));
    let prober = CoverageProber::new(&api).with_floor_year(2024);
    let mut store = MemoryCoverageStore::new();
    store.set(CoverageKey::new("country", "NG", "bgp"), cached(100, 200));

    let rows = discover_coverage(
        &prober,
        &mut store,
        &[country("NG")],
        &["bgp".to_string()],
        false,
        None,
    )
    .await
    .unwrap();

    assert_eq!(api.signal_call_count(), 0);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].coverage_source, CoverageSource::Cache);
    assert_eq!(rows[0].coverage_min_ts, Some(100));

    // refresh bypasses the cache
    let rows = discover_coverage(
        &prober,
        &mut store,
        &[country("NG")],
        &["bgp".to_string()],
        true,
        None,
    )
    .await
    .unwrap();
    assert!(api.signal_call_count() > 0);
    assert_eq!(rows[0].coverage_source, CoverageSource::Probe);
    assert_eq!(rows[0].coverage_min_ts, Some(JAN_01_2025));
}

#[tokio::test]
async fn test_every_probe_is_flushed() {
    let api = StubApi::new(|q| Ok(interval_response(q, JAN_01_2025, i64::MAX)));
    let prober = CoverageProber::new(&api).with_floor_year(2024);
    let mut store = MemoryCoverageStore::new();
    let metrics = vec!["bgp".to_string(), "ping-slash24".to_string()];

    let rows = discover_coverage(
        &prober,
        &mut store,
        &[country("GH"), country("NG")],
        &metrics,
        false,
        None,
    )
    .await
    .unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(store.len(), 4);
    // one flush per probed pair plus the closing flush
    assert_eq!(store.flush_count(), 5);
    assert!(rows.iter().all(|r| r.coverage_status == CoverageStatus::Ok));
    let keys: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r.entity_id.as_str(), r.metric.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![("GH", "bgp"), ("GH", "ping-slash24"), ("NG", "bgp"), ("NG", "ping-slash24")]
    );
}

#[tokio::test]
async fn test_file_cache_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("intermediate").join("coverage_cache.json");
    let api = StubApi::new(|q| Ok(interval_response(q, JAN_01_2025, i64::MAX)));
    let prober = CoverageProber::new(&api).with_floor_year(2024);

    {
        let mut store = JsonFileCoverageStore::open(&cache_path).unwrap();
        discover_coverage(&prober, &mut store, &[country("SN")], &["bgp".to_string()], false, None)
            .await
            .unwrap();
    }
    let calls_after_first = api.signal_call_count();

    let store = JsonFileCoverageStore::open(&cache_path).unwrap();
    assert_eq!(store.len(), 1);
    let entry = store.get(&CoverageKey::new("country", "SN", "bgp")).unwrap();
    assert_eq!(entry.earliest_ts, Some(JAN_01_2025));

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert_eq!(raw["country|SN|bgp"]["status"], "ok");

    let mut store = store;
    discover_coverage(&prober, &mut store, &[country("SN")], &["bgp".to_string()], false, None)
        .await
        .unwrap();
    assert_eq!(api.signal_call_count(), calls_after_first);
}

#[tokio::test]
async fn test_run_discovery_writes_catalog() {
    let temp_dir = TempDir::new().unwrap();
    let config = PipelineConfig::from_toml_str(&scoped_config_toml(
        &[("GH", "Ghana"), ("NG", "Nigeria")],
        &temp_dir.path().join("cache.json"),
    ))
    .unwrap();
    let api = StubApi::always_small()
        .with_countries(&[("GH", "Ghana"), ("NG", "Nigeria"), ("FR", "France")])
        .with_regions("GH", &[("4001", "Greater Accra"), ("4002", "Ashanti")])
        .with_datasources(&[("bgp", "Count"), ("ping-slash24", "Normalized")]);

    let options = DiscoveryOptions {
        probe_coverage: false,
        catalog_path: temp_dir.path().join("entity_catalog.csv"),
        markdown_path: temp_dir.path().join("entity_catalog.md"),
        snapshot_path: temp_dir.path().join("discovery_snapshot.json"),
        ..Default::default()
    };
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
    let output = run_discovery(&api, &config, &options, Some(now), None)
        .await
        .unwrap();

    assert_eq!(output.countries.len(), 2);
    assert_eq!(output.regions.len(), 2);
    assert_eq!(output.catalog.len(), 8);
    assert_eq!(api.signal_call_count(), 0);

    let catalog = load_catalog(&options.catalog_path).unwrap();
    assert_eq!(catalog.len(), output.catalog.len());
    assert_eq!(catalog[0].level, EntityType::Country);
    assert_eq!(catalog[0].entity_id, "GH");
    assert_eq!(catalog[0].metric, "bgp");
    assert_eq!(catalog[0].unit.as_deref(), Some("Count"));
    let region = catalog
        .iter()
        .find(|r| r.entity_id == "4001")
        .unwrap();
    assert_eq!(region.parent_country_id.as_deref(), Some("GH"));
    assert!(region.coverage_status.is_none());

    assert!(options.markdown_path.exists());
    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&options.snapshot_path).unwrap()).unwrap();
    assert_eq!(snapshot["generated_at_utc"], "2026-10-19T00:00:00Z");
}

#[tokio::test]
async fn test_missing_country_fails_before_probing() {
    let temp_dir = TempDir::new().unwrap();
    let config = PipelineConfig::from_toml_str(&scoped_config_toml(
        &[("GH", "Ghana"), ("SN", "Senegal")],
        &temp_dir.path().join("cache.json"),
    ))
    .unwrap();
    let api = StubApi::always_small()
        .with_countries(&[("GH", "Ghana")])
        .with_datasources(&[("bgp", "Count")]);

    let options = DiscoveryOptions {
        catalog_path: temp_dir.path().join("entity_catalog.csv"),
        markdown_path: temp_dir.path().join("entity_catalog.md"),
        snapshot_path: temp_dir.path().join("snapshot.json"),
        ..Default::default()
    };
    let err = run_discovery(&api, &config, &options, None, None)
        .await
        .unwrap_err();

    match err {
        CatalogError::MissingCountries(codes) => assert_eq!(codes, vec!["SN".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(api.signal_call_count(), 0);
    assert!(!options.catalog_path.exists());
}
