//! Asset manager tests
//!
//! Exercised with `file://` assets: a referer catalogue that can be
//! mutated between refresh cycles.

use std::sync::Arc;

use serde_json::json;

use sift_enrich::{builtin_factories, EnrichmentConf, EnrichmentOrder, Registry, RegistryCell};

use super::*;
use crate::gate::{InFlightTracker, PauseGate};

struct Fixture {
    _dir: tempfile::TempDir,
    source_path: std::path::PathBuf,
    manager: AssetManager,
    cell: Arc<RegistryCell>,
    gate: Arc<PauseGate>,
    in_flight: Arc<InFlightTracker>,
}

fn catalogue_v1() -> String {
    json!({
        "search": {"Google": {"domains": ["google.com"], "parameters": ["q"]}}
    })
    .to_string()
}

fn catalogue_v2() -> String {
    json!({
        "search": {"Google": {"domains": ["google.com"], "parameters": ["q"]}},
        "social": {"Mastodon": {"domains": ["mastodon.social"]}}
    })
    .to_string()
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("referers.json");
    std::fs::write(&source_path, catalogue_v1()).unwrap();

    let uri = format!("file://{}", source_path.display());
    let confs = vec![EnrichmentConf::new(
        "referer_parser",
        json!({"database_uri": uri}),
    )];

    let cell = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new());
    let in_flight = Arc::new(InFlightTracker::new());

    let manager = AssetManager::new(
        AssetManagerConfig {
            cache_dir: dir.path().join("cache"),
            update_period: None,
            order: EnrichmentOrder::Declared,
        },
        confs,
        Arc::new(builtin_factories()),
        Arc::clone(&cell),
        Arc::clone(&gate),
        Arc::clone(&in_flight),
        reqwest::Client::new(),
    );

    Fixture {
        _dir: dir,
        source_path,
        manager,
        cell,
        gate,
        in_flight,
    }
}

#[tokio::test]
async fn bootstrap_downloads_builds_and_opens_gate() {
    let mut f = fixture();
    assert!(!f.gate.is_open());

    f.manager.bootstrap().await.unwrap();

    assert!(f.gate.is_open());
    let registry = f.cell.snapshot();
    assert_eq!(registry.names(), vec!["referer_parser"]);
}

#[tokio::test]
async fn bootstrap_fails_on_missing_asset() {
    let mut f = fixture();
    std::fs::remove_file(&f.source_path).unwrap();

    assert!(matches!(
        f.manager.bootstrap().await,
        Err(AssetError::Fetch { .. })
    ));
    assert!(!f.gate.is_open());
}

#[tokio::test]
async fn refresh_is_a_no_op_when_nothing_changed() {
    let mut f = fixture();
    f.manager.bootstrap().await.unwrap();
    let before = f.cell.snapshot();

    let swapped = f.manager.refresh().await.unwrap();
    assert!(!swapped);
    assert!(Arc::ptr_eq(&before, &f.cell.snapshot()));
    assert!(f.gate.is_open());
}

#[tokio::test]
async fn refresh_swaps_registry_when_asset_changes() {
    let mut f = fixture();
    f.manager.bootstrap().await.unwrap();
    let before = f.cell.snapshot();

    std::fs::write(&f.source_path, catalogue_v2()).unwrap();
    let swapped = f.manager.refresh().await.unwrap();

    assert!(swapped);
    assert!(!Arc::ptr_eq(&before, &f.cell.snapshot()));
    assert!(f.gate.is_open());
    // the old snapshot is still usable by whoever holds it
    assert_eq!(before.names(), vec!["referer_parser"]);
}

#[tokio::test]
async fn refresh_rolls_back_when_new_asset_is_unusable() {
    let mut f = fixture();
    f.manager.bootstrap().await.unwrap();
    let before = f.cell.snapshot();

    std::fs::write(&f.source_path, b"{definitely not json").unwrap();
    let result = f.manager.refresh().await;

    assert!(matches!(result, Err(AssetError::Build(_))));
    // old registry stays live, gate reopened
    assert!(Arc::ptr_eq(&before, &f.cell.snapshot()));
    assert!(f.gate.is_open());

    // the live file was restored; the next build still works from it
    std::fs::write(&f.source_path, catalogue_v2()).unwrap();
    assert!(f.manager.refresh().await.unwrap());
}

#[tokio::test]
async fn refresh_aborts_on_fetch_failure() {
    let mut f = fixture();
    f.manager.bootstrap().await.unwrap();
    let before = f.cell.snapshot();

    std::fs::remove_file(&f.source_path).unwrap();
    assert!(matches!(
        f.manager.refresh().await,
        Err(AssetError::Fetch { .. })
    ));
    assert!(Arc::ptr_eq(&before, &f.cell.snapshot()));
    assert!(f.gate.is_open());
}

#[tokio::test]
async fn refresh_waits_for_in_flight_work() {
    let mut f = fixture();
    f.manager.bootstrap().await.unwrap();
    std::fs::write(&f.source_path, catalogue_v2()).unwrap();

    // an event is mid-enrichment while the refresh starts
    let guard = InFlightTracker::enter(&f.in_flight);
    let gate = Arc::clone(&f.gate);

    let release = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // by now the manager must have closed the gate
        assert!(!gate.is_open());
        drop(guard);
    });

    let swapped = f.manager.refresh().await.unwrap();
    assert!(swapped);
    assert!(f.gate.is_open());
    release.await.unwrap();
}

#[tokio::test]
async fn unsupported_scheme_is_rejected() {
    let f = fixture();
    assert!(matches!(
        f.manager.fetch("ftp://assets.example.com/x").await,
        Err(AssetError::UnsupportedScheme(_))
    ));
}
