use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use content_library::config::{Config, GlobalConfig, SiteConfig, SyncSection};
use content_library::{synchronise, LibrarySet};
use content_library_core::{Ntiid, RecordingEventSink, SyncError, SyncParams};

fn write_json(path: &Path, value: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, value.to_string()).unwrap();
}

fn write_package(root: &Path, ntiid: &str) {
    write_json(
        &root.join(ntiid.to_lowercase()).join("content_package.json"),
        json!({
            "ntiid": ntiid,
            "title": format!("Package {ntiid}"),
            "children": [{"ntiid": format!("{ntiid}.ch1")}]
        }),
    );
}

fn write_bundle(root: &Path, ntiid: &str, packages: &[&str]) {
    write_json(
        &root.join(ntiid.to_lowercase()).join("bundle_meta_info.json"),
        json!({"ntiid": ntiid, "title": format!("Bundle {ntiid}"), "ContentPackages": packages}),
    );
}

struct Fixture {
    _dir: TempDir,
    global_content: PathBuf,
    config: Config,
}

/// Global content {A, B} with bundle GB -> [A]; site alpha with content {S}
/// and bundle SB -> [A, S]; site beta with nothing of its own.
fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let global_content = dir.path().join("content");
    let global_bundles = dir.path().join("ContentPackageBundles");
    let alpha_content = dir.path().join("sites/alpha/content");
    let alpha_bundles = dir.path().join("sites/alpha/ContentPackageBundles");

    write_package(&global_content, "A");
    write_package(&global_content, "B");
    write_bundle(&global_bundles, "GB", &["A"]);
    write_package(&alpha_content, "S");
    write_bundle(&alpha_bundles, "SB", &["A", "S"]);

    let config = Config {
        global: GlobalConfig {
            name: "global".to_string(),
            root: global_content.clone(),
            bundles: Some(global_bundles),
        },
        sites: vec![
            SiteConfig {
                name: "alpha".to_string(),
                root: Some(alpha_content),
                bundles: Some(alpha_bundles),
            },
            SiteConfig {
                name: "beta".to_string(),
                root: None,
                bundles: None,
            },
        ],
        sync: SyncSection::default(),
    };

    Fixture {
        _dir: dir,
        global_content,
        config,
    }
}

fn ntiids(values: &[&str]) -> Vec<Ntiid> {
    values.iter().map(|v| Ntiid::from(*v)).collect()
}

#[tokio::test]
async fn test_full_run_reports_every_layer() {
    let fixture = fixture();
    let report = synchronise(&fixture.config, &SyncParams::default())
        .await
        .expect("sync should succeed");

    let names: Vec<&str> = report.packages.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["global", "alpha", "beta"]);
    assert_eq!(
        report.packages.for_library("global").unwrap().added,
        ntiids(&["A", "B"])
    );
    assert_eq!(report.packages.for_library("alpha").unwrap().added, ntiids(&["S"]));
    assert!(report.packages.for_library("beta").unwrap().is_empty());

    assert_eq!(report.bundles.len(), 2);
    assert_eq!(report.bundles[0].name, "global");
    assert_eq!(report.bundles[0].added, ntiids(&["GB"]));
    assert_eq!(report.bundles[1].name, "alpha");
    assert_eq!(report.bundles[1].added, ntiids(&["SB"]));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["Packages"]["Items"][0]["Name"], "global");
    assert_eq!(json["Bundles"][1]["Added"][0], "SB");
}

#[tokio::test]
async fn test_layers_share_packages_and_bundles() {
    let fixture = fixture();
    let sink = Arc::new(RecordingEventSink::new());
    let libraries = LibrarySet::open(&fixture.config, sink.clone()).await.unwrap();
    libraries.synchronise(&SyncParams::default()).await.unwrap();

    let alpha = libraries.site("alpha").unwrap();
    let beta = libraries.site("beta").unwrap();

    assert!(Arc::ptr_eq(
        &alpha.packages.get("A").unwrap(),
        &libraries.global.packages.get("A").unwrap()
    ));
    assert!(alpha.packages.contains("S"));
    assert!(!beta.packages.contains("S"));
    assert!(beta.packages.content_unit("B.ch1").is_some());

    let site_bundle = alpha.bundles.get("SB").unwrap();
    let resolved = site_bundle
        .read()
        .resolve_packages_strict(&alpha.packages)
        .unwrap();
    assert_eq!(resolved.len(), 2);

    // Global bundles are visible from every site.
    assert!(beta.bundles.contains("GB"));
    assert_eq!(alpha.bundles.bundles(true).len(), 2);

    // A, A.ch1, B, B.ch1, S, S.ch1
    assert_eq!(libraries.registry().len(), 6);
    assert_eq!(sink.count("DidSync"), 3);
    assert_eq!(sink.count("BundleLibraryModifiedOnSync"), 2);
}

#[tokio::test]
async fn test_rerun_without_changes_reports_nothing() {
    let fixture = fixture();
    let sink = Arc::new(RecordingEventSink::new());
    let libraries = LibrarySet::open(&fixture.config, sink.clone()).await.unwrap();
    libraries.synchronise(&SyncParams::default()).await.unwrap();

    let report = libraries.synchronise(&SyncParams::default()).await.unwrap();
    assert!(report.packages.iter().all(|r| r.is_empty()));
    assert!(report.bundles.iter().all(|r| r.is_empty()));
    assert_eq!(sink.count("LibraryModifiedOnSync"), 3);
}

#[tokio::test]
async fn test_removed_directory_needs_permission() {
    let fixture = fixture();
    let libraries = LibrarySet::open(&fixture.config, Arc::new(RecordingEventSink::new()))
        .await
        .unwrap();
    libraries.synchronise(&SyncParams::default()).await.unwrap();

    fs::remove_dir_all(fixture.global_content.join("b")).unwrap();

    let err = libraries
        .synchronise(&SyncParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ContentRemoval { .. }));
    assert!(libraries.global.packages.contains("B"));

    let report = libraries
        .synchronise(&SyncParams::allowing_removal())
        .await
        .unwrap();
    assert_eq!(
        report.packages.for_library("global").unwrap().removed,
        ntiids(&["B"])
    );
    assert!(libraries.site("beta").unwrap().packages.get("B").is_none());
}

#[tokio::test]
async fn test_missing_content_root_fails_to_open() {
    let mut fixture = fixture();
    fixture.config.global.root = fixture.global_content.join("missing");

    let err = synchronise(&fixture.config, &SyncParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Hierarchy(_)));
}
