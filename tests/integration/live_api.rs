//! Live checks against the public IODA API
//!
//! Ignored by default; run with `cargo test -- --ignored` when online.

use chrono::{Duration, Utc};
use ioda_pipeline::config::RequestSettings;
use ioda_pipeline::coverage::{CoverageProber, CoverageStatus};
use ioda_pipeline::downloader::{ChunkFetcher, ChunkOptions, FetchSummary, FetchTarget};
use ioda_pipeline::fetcher::ioda_http::IodaHttpClient;
use ioda_pipeline::fetcher::{list_datasources, list_entities};
use ioda_pipeline::{EntityType, Granularity, TimeWindow};
use tempfile::TempDir;

fn client() -> IodaHttpClient {
    IodaHttpClient::new(&RequestSettings::default()).unwrap()
}

#[tokio::test]
#[ignore]
async fn test_live_metadata() {
    let client = client();
    let datasources = list_datasources(&client).await.unwrap();
    assert!(datasources.iter().any(|d| d.datasource == "bgp"));

    let regions = list_entities(&client, "region", Some("country/GH"), 100)
        .await
        .unwrap();
    assert!(!regions.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_live_probe_and_fetch() {
    let client = client();
    let prober = CoverageProber::new(&client).with_floor_year(2022);
    let coverage = prober
        .probe(EntityType::Country, "NG", "bgp")
        .await
        .unwrap();
    assert_ne!(coverage.status, CoverageStatus::TransientError);

    let temp_dir = TempDir::new().unwrap();
    let fetcher = ChunkFetcher::new(&client, temp_dir.path(), ChunkOptions::default());
    let end = Utc::now() - Duration::days(2);
    let window = TimeWindow::new(end - Duration::days(1), end);
    let mut summary = FetchSummary::default();
    fetcher
        .fetch_target(
            &FetchTarget::new(EntityType::Country, "NG", "bgp"),
            window,
            Granularity::Day,
            &mut summary,
        )
        .await
        .unwrap();
    assert!(summary.written_chunks >= 1);
}
