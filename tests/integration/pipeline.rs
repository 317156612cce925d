//! End-to-end run over a stub API: discover → fetch → build-panel → qa

use chrono::{DateTime, TimeZone, Utc};
use ioda_pipeline::catalog::discovery::{run_discovery, DiscoveryOptions};
use ioda_pipeline::cli::fetch::{run_fetch, FetchRun};
use ioda_pipeline::cli::CliError;
use ioda_pipeline::config::PipelineConfig;
use ioda_pipeline::downloader::{ChunkOptions, DownloadError};
use ioda_pipeline::fetcher::FetcherError;
use ioda_pipeline::output::path::{LONG_TABLE_FILE, QA_SUMMARY_FILE};
use ioda_pipeline::qa::{last_run_lookup, run_qa};
use ioda_pipeline::transform::{load_long_table, run_build_panel};
use ioda_pipeline::{Granularity, LevelFilter};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::support::{scoped_config_toml, small_response, StubApi};

const FEB_20_2026: i64 = 1_771_545_600;
const FEB_21_2026: i64 = 1_771_632_000;

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn stub() -> StubApi {
    StubApi::always_small()
        .with_countries(&[("GH", "Ghana"), ("NG", "Nigeria")])
        .with_regions("GH", &[("4001", "Greater Accra"), ("4002", "Ashanti")])
        .with_datasources(&[("bgp", "Count"), ("ping-slash24", "Normalized")])
}

async fn discover(api: &StubApi, root: &Path) -> PathBuf {
    let config = PipelineConfig::from_toml_str(&scoped_config_toml(
        &[("GH", "Ghana"), ("NG", "Nigeria")],
        &root.join("cache.json"),
    ))
    .unwrap();
    let options = DiscoveryOptions {
        probe_coverage: false,
        catalog_path: root.join("processed").join("entity_catalog.csv"),
        markdown_path: root.join("docs").join("entity_catalog.md"),
        snapshot_path: root.join("intermediate").join("discovery_snapshot.json"),
        ..Default::default()
    };
    run_discovery(api, &config, &options, Some(utc(2026, 10, 19)), None)
        .await
        .unwrap();
    options.catalog_path
}

fn fetch_run(catalog_path: PathBuf, raw_dir: PathBuf) -> FetchRun {
    FetchRun {
        catalog_path,
        raw_dir,
        level: LevelFilter::Both,
        metrics: Some(vec!["bgp".to_string()]),
        limit_entities: None,
        start: Some(utc(2026, 2, 20)),
        end: Some(utc(2026, 2, 22)),
        last_run: None,
        initial: Granularity::Day,
        options: ChunkOptions::default(),
    }
}

#[tokio::test]
async fn test_full_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let api = stub();
    let catalog_path = discover(&api, root).await;
    let raw_dir = root.join("raw");
    let processed_dir = root.join("processed");

    let report = run_fetch(
        &api,
        &fetch_run(catalog_path.clone(), raw_dir.clone()),
        utc(2026, 10, 19),
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(report.summary.targets, 4);
    assert_eq!(report.summary.planned_chunks, 8);
    assert_eq!(report.summary.written_chunks, 8);
    assert_eq!(report.summary.errors, 0);
    assert!(api
        .signal_calls()
        .iter()
        .all(|q| q.datasource.as_deref() == Some("bgp")));

    let outputs = run_build_panel(&raw_dir, &catalog_path, &processed_dir).unwrap();
    assert_eq!(outputs.long.len(), 16);
    assert_eq!(outputs.country_panel.rows.len(), 8);
    assert_eq!(outputs.region_panel.rows.len(), 8);
    assert_eq!(
        outputs.country_panel.header,
        vec![
            "timestamp_utc",
            "entity_id",
            "entity_name",
            "parent_country_id",
            "parent_country_name",
            "bgp"
        ]
    );
    assert_eq!(outputs.samples.len(), 4);

    let first = &outputs.long[0];
    assert_eq!(first.level, "country");
    assert_eq!(first.entity_id, "GH");
    assert_eq!(first.entity_name.as_deref(), Some("GH name"));
    assert_eq!(first.unit.as_deref(), Some("Count"));
    assert_eq!(first.timestamp_utc.timestamp(), FEB_20_2026);
    assert_eq!(first.raw_window_start_ts, Some(FEB_20_2026));
    assert_eq!(first.raw_window_end_ts, Some(FEB_21_2026));

    let region = outputs
        .long
        .iter()
        .find(|r| r.level == "region")
        .unwrap();
    assert_eq!(region.parent_country_id.as_deref(), Some("GH"));

    let long_path = processed_dir.join(LONG_TABLE_FILE);
    assert_eq!(load_long_table(&long_path).unwrap().len(), 16);

    let summary_path = processed_dir.join(QA_SUMMARY_FILE);
    let report_path = root.join("docs").join("qa_report.md");
    let summary = run_qa(&long_path, &summary_path, &report_path, utc(2026, 10, 19)).unwrap();
    assert_eq!(summary.len(), 4);
    assert!(summary.iter().all(|g| g.n_rows == 4 && g.n_null == 0));
    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("- Total rows represented: `16`"));

    let lookup = last_run_lookup(&summary_path, &long_path);
    let key = ("country".to_string(), "GH".to_string(), "bgp".to_string());
    assert_eq!(lookup[&key].timestamp(), FEB_21_2026 + 3600);

    // incremental run resumes one second after the last processed point
    let calls_before = api.signal_call_count();
    let mut incremental = fetch_run(catalog_path, raw_dir);
    incremental.last_run = Some(lookup);
    let report = run_fetch(&api, &incremental, utc(2026, 10, 19), None, None)
        .await
        .unwrap();
    assert_eq!(report.summary.written_chunks, 4);
    let new_calls = &api.signal_calls()[calls_before..];
    assert!(new_calls.iter().all(|q| q.from == FEB_21_2026 + 3601));
}

#[tokio::test]
async fn test_dry_run_reports_plan() {
    let temp_dir = TempDir::new().unwrap();
    let api = stub();
    let catalog_path = discover(&api, temp_dir.path()).await;

    let mut run = fetch_run(catalog_path, temp_dir.path().join("raw"));
    run.level = LevelFilter::Country;
    run.limit_entities = Some(1);
    run.options.dry_run = true;
    let report = run_fetch(&api, &run, utc(2026, 10, 19), None, None)
        .await
        .unwrap();

    assert_eq!(report.summary.targets, 1);
    assert_eq!(report.summary.dry_run_chunks, 2);
    assert_eq!(api.signal_call_count(), 0);
    let labels: Vec<&str> = report.planned.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec!["country/GH/bgp", "country/GH/bgp"]);
    assert!(!temp_dir.path().join("raw").exists());
}

#[tokio::test]
async fn test_abort_reports_all_selected_targets() {
    let temp_dir = TempDir::new().unwrap();
    let catalog_path = discover(&stub(), temp_dir.path()).await;

    let api = StubApi::new(|q| {
        if q.entity_code == "GH" {
            Err(FetcherError::Api("400 bad request".to_string()))
        } else {
            Ok(small_response(q))
        }
    });
    let mut run = fetch_run(catalog_path, temp_dir.path().join("raw"));
    run.level = LevelFilter::Country;
    let err = run_fetch(&api, &run, utc(2026, 10, 19), None, None)
        .await
        .unwrap_err();

    match err {
        CliError::FetchAborted {
            target,
            summary,
            source,
        } => {
            assert_eq!(target, "country/GH/bgp");
            assert_eq!(summary.targets, 2);
            assert_eq!(summary.planned_chunks, 1);
            assert_eq!(summary.errors, 1);
            assert_eq!(summary.written_chunks, 0);
            assert!(matches!(source, DownloadError::Fetcher(FetcherError::Api(_))));
        }
        other => panic!("unexpected error: {other}"),
    }
    // NG is never reached
    assert_eq!(api.signal_call_count(), 1);
}

#[tokio::test]
async fn test_fetch_without_catalog_fails() {
    let temp_dir = TempDir::new().unwrap();
    let api = stub();
    let run = fetch_run(
        temp_dir.path().join("missing.csv"),
        temp_dir.path().join("raw"),
    );
    let err = run_fetch(&api, &run, utc(2026, 10, 19), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Catalog(_)));
    assert_eq!(api.signal_call_count(), 0);
}

#[test]
fn test_build_panel_on_empty_archive() {
    let temp_dir = TempDir::new().unwrap();
    let processed_dir = temp_dir.path().join("processed");
    let outputs = run_build_panel(
        &temp_dir.path().join("raw"),
        &temp_dir.path().join("missing_catalog.csv"),
        &processed_dir,
    )
    .unwrap();

    assert!(outputs.long.is_empty());
    assert!(outputs.country_panel.rows.is_empty());
    assert!(processed_dir.join("ioda_country_panel.csv").exists());
    assert!(!processed_dir.join("ioda_region_panel.csv").exists());
}
