//! End-to-end pipeline tests against a scripted remote.
//!
//! # Test Strategy
//!
//! Every test runs the real pipeline (caches, pagination, dispatcher,
//! aggregation) in a temporary data directory. Only the transport is
//! replaced, by [`common::MockRemote`], which counts every request. That makes
//! "no network" assertions exact: a cached unit must cost zero requests.

mod common;

use common::{address, market, markets, ContractScript, MockRemote};
use market_ingest::cache::ContractCache;
use market_ingest::config::Config;
use market_ingest::contracts::ContractAddress;
use market_ingest::dataset::Dataset;
use market_ingest::error::IngestError;
use market_ingest::events::{EventRecord, OWNER_COLUMN};
use market_ingest::pipeline::Pipeline;
use market_ingest::retriever::RetrievalStatus;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use walkdir::WalkDir;

fn config(dir: &Path, years: Vec<i32>) -> Config {
    Config::for_data_dir(dir)
        .with_listing_url("https://listing.test/markets")
        .with_rpc_url("https://rpc.test/")
        .with_years(years)
        .with_page_size(50)
        .with_backoff(Duration::from_secs(10), 5)
        .with_max_concurrency(4)
}

/// Every file under `dir` with its bytes.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let bytes = std::fs::read(entry.path()).unwrap();
            (entry.into_path(), bytes)
        })
        .collect()
}

fn contract(raw: &str) -> ContractAddress {
    ContractAddress::parse(raw).unwrap()
}

/// Pages of 50/50/37: 137 records, no request past offset 100.
#[tokio::test]
async fn test_pagination_stops_at_short_page() {
    let dir = tempdir().unwrap();
    let remote = MockRemote::new().with_year(2023, markets(1, 137, &address(0x11)));
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), remote);

    let summary = pipeline.run_markets().await.unwrap();

    assert_eq!(summary.sources.len(), 1);
    assert_eq!(summary.sources[0].records, 137);
    assert_eq!(summary.merged_rows, 137);
    assert_eq!(
        pipeline.client().transport().requested_pages(),
        vec![(2023, 0), (2023, 50), (2023, 100)]
    );

    let merged = Dataset::read_csv(&pipeline.markets_output()).unwrap();
    assert_eq!(merged.len(), 137);
}

/// Years are separate sources with separate artifacts.
#[tokio::test]
async fn test_each_year_is_its_own_source() {
    let dir = tempdir().unwrap();
    let remote = MockRemote::new()
        .with_year(2023, markets(1, 3, &address(0x11)))
        .with_year(2022, markets(100, 50, &address(0x22)));
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023, 2022]), remote);

    let summary = pipeline.run_markets().await.unwrap();

    assert_eq!(summary.merged_rows, 53);
    let bronze = dir.path().join("bronze");
    assert!(bronze.join("markets_2023_offset_0.json").exists());
    assert!(bronze.join("markets_2022_offset_0.json").exists());
    // exactly one full page, so the empty terminal page is fetched and cached
    assert_eq!(std::fs::read_to_string(bronze.join("markets_2022_offset_50.json")).unwrap(), "[]");
}

/// A second run against an unchanged remote is offline and byte-identical.
#[tokio::test]
async fn test_rerun_is_idempotent_and_offline() {
    let dir = tempdir().unwrap();
    let remote = || {
        MockRemote::new()
            .with_year(
                2023,
                vec![
                    market(1, &address(0x11), "Sports"),
                    market(2, &address(0x22), "Crypto"),
                    market(3, &address(0x11), "Sports"),
                ],
            )
            .with_year(2022, vec![market(0, &address(0x33), "Politics")])
            .with_contract(&address(0x11), ContractScript::Buys(3))
            .with_contract(&address(0x22), ContractScript::Buys(1))
    };

    let first = Pipeline::with_transport(config(dir.path(), vec![2023, 2022]), remote());
    let summary = first.run().await.unwrap();
    assert_eq!(summary.buys.report.fetched, 3);
    assert_eq!(summary.buys.merged_rows, 4);
    assert!(first.client().transport().calls() > 0);
    let before = snapshot(dir.path());

    let second = Pipeline::with_transport(config(dir.path(), vec![2023, 2022]), remote());
    let summary = second.run().await.unwrap();

    assert_eq!(second.client().transport().calls(), 0);
    assert_eq!(summary.stats.requests, 0);
    assert_eq!(summary.buys.report.cached, 3);
    assert_eq!(snapshot(dir.path()), before);
}

/// A decode failure for one contract leaves its siblings intact.
#[tokio::test]
async fn test_decode_failure_is_isolated() {
    let dir = tempdir().unwrap();
    let [c1, c2, c3, c4] = [address(0xc1), address(0xc2), address(0xc3), address(0xc4)];
    let remote = MockRemote::new()
        .with_contract(&c1, ContractScript::Buys(2))
        .with_contract(&c2, ContractScript::Buys(1))
        .with_contract(&c3, ContractScript::Malformed)
        .with_contract(&c4, ContractScript::Buys(5));
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), remote);

    let mut listing = Dataset::new(vec!["id".into(), "marketMakerAddress".into()]);
    for (i, maker) in [&c1, &c2, &c3, &c4].into_iter().enumerate() {
        listing.push_row(vec![i.to_string(), maker.clone()]).unwrap();
    }

    let summary = pipeline.run_buys_for(&listing).await.unwrap();
    let report = &summary.report;

    assert_eq!(report.fetched, 3);
    assert_eq!(report.failed, 1);
    assert!(matches!(report.statuses[&contract(&c3)], RetrievalStatus::Failed(_)));

    let cache = ContractCache::new(dir.path().join("bronze"));
    assert!(cache.path(&contract(&c1)).exists());
    assert!(cache.path(&contract(&c2)).exists());
    assert!(!cache.path(&contract(&c3)).exists());
    assert!(cache.path(&contract(&c4)).exists());
    assert_eq!(summary.merged_rows, 8);
}

/// An RPC error envelope is a per-contract failure and is retried next run.
#[tokio::test]
async fn test_rpc_error_retried_on_next_run() {
    let dir = tempdir().unwrap();
    let maker = address(0x44);
    let mut listing = Dataset::new(vec!["marketMakerAddress".into()]);
    listing.push_row(vec![maker.clone()]).unwrap();

    let failing = MockRemote::new().with_contract(&maker, ContractScript::RpcError);
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), failing);
    let summary = pipeline.run_buys_for(&listing).await.unwrap();
    assert_eq!(summary.report.failed, 1);

    let healthy = MockRemote::new().with_contract(&maker, ContractScript::Buys(2));
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), healthy);
    let summary = pipeline.run_buys_for(&listing).await.unwrap();
    assert_eq!(summary.report.fetched, 1);
    assert_eq!(pipeline.client().transport().posts(), 1);
}

/// A complete artifact means zero network calls; malformed makers are excluded.
#[tokio::test]
async fn test_cached_contract_and_excluded_inputs() {
    let dir = tempdir().unwrap();
    let maker = address(0x55);
    let cache = ContractCache::new(dir.path().join("bronze"));
    cache.write(&contract(&maker), &[]).unwrap();

    let mut listing = Dataset::new(vec!["marketMakerAddress".into()]);
    for value in [maker.as_str(), "0xABC", "", "nan"] {
        listing.push_row(vec![value.to_string()]).unwrap();
    }

    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), MockRemote::new());
    let summary = pipeline.run_buys_for(&listing).await.unwrap();

    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.report.cached, 1);
    assert_eq!(summary.report.excluded, vec!["0xABC", "nan"]);
    assert_eq!(pipeline.client().transport().calls(), 0);
}

/// A legacy artifact is rewritten to the current layout without the network.
#[tokio::test]
async fn test_legacy_artifact_is_migrated() {
    let dir = tempdir().unwrap();
    let maker = address(0x66);
    let cache = ContractCache::new(dir.path().join("bronze"));
    let path = cache.path(&contract(&maker));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        "Unnamed: 0,buyer,investmentAmount,feeAmount,outcomeIndex,outcomeTokensBought\n\
         0,0xbb,1000,20,1,1900\n\
         1,0xbb,2000,40,0,3800\n",
    )
    .unwrap();

    let mut listing = Dataset::new(vec!["marketMakerAddress".into()]);
    listing.push_row(vec![maker.clone()]).unwrap();

    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), MockRemote::new());
    let summary = pipeline.run_buys_for(&listing).await.unwrap();

    assert_eq!(summary.report.migrated, 1);
    assert_eq!(pipeline.client().transport().calls(), 0);

    let migrated = Dataset::read_csv(&path).unwrap();
    assert_eq!(migrated.columns(), EventRecord::COLUMNS.as_slice());
    assert_eq!(migrated.len(), 2);
    let owner = contract(&maker).checksummed();
    assert_eq!(
        migrated.column_values(OWNER_COLUMN).unwrap(),
        vec![owner.as_str(), owner.as_str()]
    );

    let merged = Dataset::read_csv(&pipeline.buys_output()).unwrap();
    assert_eq!(merged, migrated);
}

/// Throttled requests back off and then succeed.
#[tokio::test(start_paused = true)]
async fn test_throttling_recovers() {
    let dir = tempdir().unwrap();
    let remote = MockRemote::new()
        .with_year(2023, markets(1, 10, &address(0x77)))
        .with_throttles(3);
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), remote);

    let started = tokio::time::Instant::now();
    let summary = pipeline.run_markets().await.unwrap();

    assert_eq!(summary.merged_rows, 10);
    let stats = pipeline.client().stats();
    assert_eq!(stats.backoffs, 3);
    assert_eq!(stats.requests, 4);
    assert_eq!(started.elapsed(), Duration::from_secs(30));
}

/// Sustained throttling fails the markets phase after the ceiling.
#[tokio::test(start_paused = true)]
async fn test_throttle_ceiling_fails_markets_phase() {
    let dir = tempdir().unwrap();
    let remote = MockRemote::new()
        .with_year(2023, markets(1, 10, &address(0x77)))
        .with_throttles(100);
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), remote);

    let result = pipeline.run_markets().await;

    assert!(matches!(
        result,
        Err(IngestError::ThrottledRetryExceeded { attempts: 6, .. })
    ));
    assert_eq!(pipeline.client().stats().backoffs, 5);
}

/// A failed year does not stop the others from being fetched and merged,
/// but the run stops before the buys phase.
#[tokio::test(start_paused = true)]
async fn test_failed_source_stops_run_after_merge() {
    let dir = tempdir().unwrap();
    // Exactly enough 429s to exhaust 2023 (1 attempt + 5 retries)
    let remote = MockRemote::new()
        .with_year(2023, markets(1, 10, &address(0x77)))
        .with_year(2022, markets(100, 7, &address(0x88)))
        .with_throttles(6);
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023, 2022]), remote);

    let result = pipeline.run().await;

    assert!(matches!(result, Err(IngestError::ThrottledRetryExceeded { .. })));
    let merged = Dataset::read_csv(&pipeline.markets_output()).unwrap();
    assert_eq!(merged.len(), 7);
    assert_eq!(pipeline.client().transport().posts(), 0);
}

#[tokio::test]
async fn test_zero_page_size_is_a_config_error() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), vec![2023]).with_page_size(0);
    let pipeline = Pipeline::with_transport(config, MockRemote::new());

    let result = pipeline.run_markets().await;

    assert!(matches!(result, Err(IngestError::ConfigError { .. })));
    assert_eq!(pipeline.client().transport().calls(), 0);
}

#[tokio::test]
async fn test_buys_without_listing_is_an_error() {
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), MockRemote::new());

    assert!(matches!(pipeline.run_buys().await, Err(IngestError::CacheError { .. })));
}

#[tokio::test]
async fn test_categories_from_merged_listing() {
    let dir = tempdir().unwrap();
    let remote = MockRemote::new().with_year(
        2023,
        vec![
            market(1, &address(0x11), "Sports"),
            market(2, &address(0x11), "Crypto"),
            market(3, &address(0x11), "Pop-"),
            market(4, &address(0x11), "Sports"),
        ],
    );
    let pipeline = Pipeline::with_transport(config(dir.path(), vec![2023]), remote);
    pipeline.run_markets().await.unwrap();

    let categories = pipeline.categories().unwrap();

    assert_eq!(categories.labels(), &["Sports", "Crypto"]);
}
