use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use content_library_core::bundle::BUNDLE_META_NAME;
use content_library_core::enumeration::{MockPackageFactory, TOC_FILENAME};
use content_library_core::hierarchy::{FilesystemBucket, HierarchyBucket, MemoryBucket};
use content_library_core::{
    sync_from_bucket, BundleLibrary, ContentPackage, ContentPackageEnumeration,
    ContentPackageLibrary, ContentUnit, HierarchyEnumeration, HierarchyError,
    JsonTocPackageFactory, Ntiid, SyncError, SyncParams, SyncResults,
};

fn write_json(path: &Path, value: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, value.to_string()).unwrap();
}

fn write_package(root: &Path, dir: &str, ntiid: &str) {
    write_json(
        &root.join(dir).join(TOC_FILENAME),
        json!({
            "ntiid": ntiid,
            "title": format!("Package {ntiid}"),
            "children": [
                {"ntiid": format!("{ntiid}.1"), "embeddedContainerNTIIDs": ["E1"]},
                {"ntiid": format!("{ntiid}.2")}
            ]
        }),
    );
}

async fn filesystem_library(root: &Path) -> ContentPackageLibrary {
    let bucket = FilesystemBucket::open(root).await.unwrap();
    let enumeration = HierarchyEnumeration::new(Arc::new(bucket), Arc::new(JsonTocPackageFactory));
    ContentPackageLibrary::new("global", Arc::new(enumeration))
}

#[tokio::test]
async fn test_directory_tree_syncs_into_library() {
    let dir = TempDir::new().unwrap();
    let content = dir.path().join("content");
    write_package(&content, "alpha", "A");
    write_package(&content, "beta", "B");
    write_package(&content, "_authored_draft", "D");
    fs::create_dir_all(content.join("not-a-package")).unwrap();
    fs::write(content.join("notes.txt"), "ignored").unwrap();

    let library = filesystem_library(&content).await;
    let mut results = SyncResults::new();
    let result = library
        .sync_content_packages(&SyncParams::default(), &mut results)
        .await
        .expect("filesystem sync should succeed");

    assert_eq!(result.added, vec![Ntiid::from("A"), Ntiid::from("B")]);
    assert!(!library.contains("D"), "authored content is not enumerated");

    let alpha = library.get("A").unwrap();
    assert_eq!(alpha.title(), "Package A");
    assert_eq!(
        alpha.root.as_deref(),
        Some(content.join("alpha").display().to_string().as_str())
    );
    assert!(alpha.last_modified > 0.0);

    let unit = library.content_unit("A.2").unwrap();
    assert_eq!(unit.unit().ordinal, 2);
    assert_eq!(library.paths_to_embedded_ntiid("E1").len(), 2);

    // Nothing on disk changed.
    let again = library
        .sync_content_packages(&SyncParams::default(), &mut results)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_malformed_toc_fails_the_sync() {
    let dir = TempDir::new().unwrap();
    let content = dir.path().join("content");
    fs::create_dir_all(content.join("broken")).unwrap();
    fs::write(content.join("broken").join(TOC_FILENAME), "{").unwrap();

    let library = filesystem_library(&content).await;
    let err = library
        .sync_content_packages(&SyncParams::default(), &mut SyncResults::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Hierarchy(HierarchyError::Json { .. })));
    assert!(!library.is_synced());
}

#[tokio::test]
async fn test_missing_root_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = FilesystemBucket::open(dir.path().join("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, HierarchyError::Io { .. }));
}

#[tokio::test]
async fn test_bundles_on_disk_reference_synced_packages() {
    let dir = TempDir::new().unwrap();
    let content = dir.path().join("content");
    let bundles_dir = dir.path().join("ContentPackageBundles");
    write_package(&content, "alpha", "A");
    write_json(
        &bundles_dir.join("first").join(BUNDLE_META_NAME),
        json!({"ntiid": "B1", "title": "Bundle", "ContentPackages": ["A"]}),
    );

    let library = filesystem_library(&content).await;
    library
        .sync_content_packages(&SyncParams::default(), &mut SyncResults::new())
        .await
        .unwrap();

    let bundles = BundleLibrary::new("global");
    let bucket = FilesystemBucket::open(&bundles_dir).await.unwrap();
    let results = sync_from_bucket(&bundles, &library, &bucket).await.unwrap();
    assert_eq!(results.added, vec![Ntiid::from("B1")]);

    let bundle = bundles.get("B1").unwrap();
    let packages = bundle.read().resolve_packages_strict(&library).unwrap();
    assert!(Arc::ptr_eq(&packages[0], &library.get("A").unwrap()));
    assert_eq!(
        bundle.read().root.as_deref(),
        Some(bundles_dir.join("first").display().to_string().as_str())
    );
}

#[tokio::test]
async fn test_enumeration_consults_factory_for_each_candidate() {
    let root = MemoryBucket::new("content")
        .with_bucket(MemoryBucket::new("one"))
        .with_bucket(MemoryBucket::new("two"))
        .with_bucket(MemoryBucket::new("_authored_three"))
        .with_key("stray.json", "{}", 1.0)
        .with_times(42.0, 7.0);

    let mut factory = MockPackageFactory::new();
    factory
        .expect_package_for()
        .times(2)
        .returning(|bucket: Arc<dyn HierarchyBucket>| {
            if bucket.name() == "two" {
                return Ok(None);
            }
            Ok(Some(ContentPackage::new(ContentUnit::new(bucket.name()), 1.0)))
        });

    let enumeration = HierarchyEnumeration::new(Arc::new(root), Arc::new(factory));
    let packages = enumeration.enumerate_content_packages().await.unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].ntiid(), "one");
    assert_eq!(enumeration.last_modified(), 42.0);
    assert_eq!(enumeration.created_time(), 7.0);
}
