use mockall::Sequence;
use std::sync::Arc;

use content_library_core::enumeration::MockContentPackageEnumeration;
use content_library_core::events::MockEventSink;
use content_library_core::{
    ContentPackage, ContentPackageLibrary, ContentUnit, HierarchyError, LibraryEvent, Ntiid,
    RecordingEventSink, StaticEnumeration, SyncError, SyncParams, SyncResults,
};

/// A package `ntiid` with one chapter `<ntiid>.ch1` that embeds `E1`.
fn package(ntiid: &str, last_modified: f64) -> ContentPackage {
    ContentPackage::new(
        ContentUnit::new(ntiid)
            .with_title(format!("Package {ntiid}"))
            .with_child(ContentUnit::new(format!("{ntiid}.ch1")).with_embedded("E1")),
        last_modified,
    )
}

fn library_with(
    packages: Vec<ContentPackage>,
) -> (
    ContentPackageLibrary,
    Arc<StaticEnumeration>,
    Arc<RecordingEventSink>,
) {
    let enumeration = Arc::new(StaticEnumeration::new(packages));
    let sink = Arc::new(RecordingEventSink::new());
    let library = ContentPackageLibrary::new("global", enumeration.clone())
        .with_event_sink(sink.clone());
    (library, enumeration, sink)
}

async fn sync(
    library: &ContentPackageLibrary,
    params: &SyncParams,
) -> Result<content_library_core::LibrarySyncResults, SyncError> {
    let mut results = SyncResults::new();
    library.sync_content_packages(params, &mut results).await
}

fn ntiids(values: &[&str]) -> Vec<Ntiid> {
    values.iter().map(|v| Ntiid::from(*v)).collect()
}

#[tokio::test]
async fn test_end_to_end_add_modify_remove() {
    let (library, enumeration, _sink) = library_with(vec![package("P1", 100.0)]);
    let mut results = SyncResults::new();

    let first = library
        .sync_content_packages(&SyncParams::default(), &mut results)
        .await
        .expect("first sync should succeed");
    assert_eq!(first.added, ntiids(&["P1"]));
    assert_eq!(library.get("P1").unwrap().last_modified, 100.0);

    enumeration.set_packages(vec![package("P1", 200.0)]);
    let second = library
        .sync_content_packages(&SyncParams::default(), &mut results)
        .await
        .expect("second sync should succeed");
    assert_eq!(second.modified, ntiids(&["P1"]));
    assert!(second.added.is_empty());
    assert_eq!(library.get("P1").unwrap().last_modified, 200.0);

    enumeration.set_packages(vec![]);
    let third = library
        .sync_content_packages(&SyncParams::allowing_removal(), &mut results)
        .await
        .expect("third sync should succeed");
    assert_eq!(third.removed, ntiids(&["P1"]));
    assert!(!library.contains("P1"));
    assert!(library.content_unit("P1.ch1").is_none());
    assert!(library.content_unit("P1").is_none());

    assert_eq!(results.len(), 3);
    assert_eq!(results.items[0].name, "global");
}

#[tokio::test]
async fn test_second_sync_without_changes_is_a_no_op() {
    let (library, _enumeration, sink) = library_with(vec![package("A", 1.0), package("B", 1.0)]);

    sync(&library, &SyncParams::default()).await.unwrap();
    let before = library.get("A").unwrap();

    let second = sync(&library, &SyncParams::default()).await.unwrap();
    assert!(second.is_empty(), "second sync should report nothing: {second:?}");
    assert_eq!(sink.count("LibraryModifiedOnSync"), 1);
    assert_eq!(sink.count("Unmodified"), 2);
    assert_eq!(sink.count("DidSync"), 2);

    let after = library.get("A").unwrap();
    assert!(Arc::ptr_eq(&before, &after), "unchanged package must keep its identity");
}

#[tokio::test]
async fn test_removal_is_refused_without_permission() {
    let (library, enumeration, sink) = library_with(vec![package("A", 1.0), package("B", 1.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();
    sink.clear();

    enumeration.set_packages(vec![package("A", 1.0)]);
    let err = sync(&library, &SyncParams::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::ContentRemoval { .. }));
    assert_eq!(err.code(), Some(1));
    assert!(err.to_string().ends_with("Code:1"));

    assert!(library.contains("A"));
    assert!(library.contains("B"));
    assert!(library.content_unit("B.ch1").is_some());
    assert_eq!(sink.labels(), vec!["WillSync".to_string()]);

    let removed = sync(&library, &SyncParams::allowing_removal()).await.unwrap();
    assert_eq!(removed.removed, ntiids(&["B"]));
    assert!(library.contains("A"));
    assert!(!library.contains("B"));
    assert!(library.content_unit("B.ch1").is_none());
    assert_eq!(library.len(), 1);
}

#[tokio::test]
async fn test_only_strictly_newer_timestamps_count_as_changes() {
    let (library, enumeration, _sink) = library_with(vec![package("A", 10.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();

    // Same timestamp, different tree.
    let rewritten = ContentPackage::new(
        ContentUnit::new("A").with_child(ContentUnit::new("A.new")),
        10.0,
    );
    enumeration.set_packages(vec![rewritten]);
    let result = sync(&library, &SyncParams::default()).await.unwrap();
    assert!(result.modified.is_empty());
    assert!(library.content_unit("A.new").is_none());
    assert!(library.content_unit("A.ch1").is_some());

    enumeration.set_packages(vec![package("A", 5.0)]);
    let result = sync(&library, &SyncParams::default()).await.unwrap();
    assert!(result.modified.is_empty());

    let newer = ContentPackage::new(
        ContentUnit::new("A").with_child(ContentUnit::new("A.new")),
        11.0,
    );
    enumeration.set_packages(vec![newer]);
    let result = sync(&library, &SyncParams::default()).await.unwrap();
    assert_eq!(result.modified, ntiids(&["A"]));
    assert!(library.content_unit("A.new").is_some());
    assert!(library.content_unit("A.ch1").is_none(), "old units must be purged");
}

#[tokio::test]
async fn test_events_fire_in_documented_order() {
    let (library, enumeration, sink) = library_with(vec![
        package("A", 1.0),
        package("B", 1.0),
        package("C", 1.0),
    ]);
    sync(&library, &SyncParams::default()).await.unwrap();
    sink.clear();

    enumeration.set_packages(vec![package("A", 1.0), package("B", 2.0), package("D", 1.0)]);
    sync(&library, &SyncParams::allowing_removal()).await.unwrap();

    assert_eq!(
        sink.labels(),
        vec![
            "WillSync",
            "Removed:C",
            "Replaced:B",
            "Created:D",
            "Added:D",
            "LibraryModifiedOnSync",
            "Unmodified:A",
            "DidSync",
        ]
    );

    let events = sink.events();
    let aggregate = events
        .iter()
        .find_map(|(_, e)| match e {
            LibraryEvent::LibraryModifiedOnSync {
                added,
                removed,
                changed,
            } => Some((added.clone(), removed.clone(), changed.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(aggregate, (ntiids(&["D"]), ntiids(&["C"]), ntiids(&["B"])));

    let (old, new) = events
        .iter()
        .find_map(|(_, e)| match e {
            LibraryEvent::Replaced { new, old } => Some((old.clone(), new.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(old.last_modified, 1.0);
    assert_eq!(new.last_modified, 2.0);
    assert_eq!(old.owner(), None);
    assert_eq!(new.owner().as_deref(), Some("global"));
}

#[tokio::test]
async fn test_mocked_sink_sees_add_sequence() {
    let mut sink = MockEventSink::new();
    let mut seq = Sequence::new();
    for label in ["WillSync", "Created", "Added", "LibraryModifiedOnSync", "DidSync"] {
        sink.expect_notify()
            .withf(move |library, event| library == "global" && event.label() == label)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
    }

    let library = ContentPackageLibrary::new(
        "global",
        Arc::new(StaticEnumeration::new(vec![package("P1", 1.0)])),
    )
    .with_event_sink(Arc::new(sink));

    sync(&library, &SyncParams::default()).await.unwrap();
}

#[tokio::test]
async fn test_first_sync_of_empty_enumeration_still_reports() {
    let (library, _enumeration, sink) = library_with(vec![]);
    assert!(!library.is_synced());
    assert_eq!(library.last_modified(), -1.0);

    let result = sync(&library, &SyncParams::default()).await.unwrap();
    assert!(result.is_empty());
    assert!(library.is_synced());
    assert_eq!(library.last_modified(), 0.0);
    assert_eq!(sink.count("LibraryModifiedOnSync"), 1);
    assert!(library.last_synchronized() > 0.0);
}

#[tokio::test]
async fn test_enumeration_timestamp_drives_last_modified() {
    let (library, enumeration, _sink) = library_with(vec![package("A", 1.0)]);
    enumeration.set_last_modified(50.0);
    sync(&library, &SyncParams::default()).await.unwrap();
    assert_eq!(library.last_modified(), 50.0);

    // Nothing changed: the captured timestamp stays.
    enumeration.set_last_modified(60.0);
    sync(&library, &SyncParams::default()).await.unwrap();
    assert_eq!(library.last_modified(), 50.0);

    library.add(package("B", 1.0)).unwrap();
    assert!(library.last_modified() > 60.0);
}

#[tokio::test]
async fn test_enumeration_failure_propagates() {
    let mut enumeration = MockContentPackageEnumeration::new();
    enumeration
        .expect_enumerate_content_packages()
        .times(1)
        .returning(|| Err(HierarchyError::NotFound("/content".to_string())));

    let library = ContentPackageLibrary::new("global", Arc::new(enumeration));
    let err = sync(&library, &SyncParams::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::Hierarchy(HierarchyError::NotFound(_))));
    assert_eq!(err.code(), None);
    assert!(!library.is_synced());
}

#[tokio::test]
async fn test_duplicate_enumerated_ntiids_fail_before_mutation() {
    let mut enumeration = MockContentPackageEnumeration::new();
    enumeration
        .expect_enumerate_content_packages()
        .returning(|| Ok(vec![package("A", 1.0), package("A", 2.0)]));
    enumeration.expect_last_modified().return_const(0.0);

    let library = ContentPackageLibrary::new("global", Arc::new(enumeration));
    let err = sync(&library, &SyncParams::default()).await.unwrap_err();
    assert_eq!(err.code(), Some(100));
    assert!(!library.is_synced());
}

#[tokio::test]
async fn test_ntiid_filter_never_adds() {
    let (library, enumeration, _sink) = library_with(vec![package("A", 1.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();

    enumeration.set_packages(vec![package("A", 2.0), package("B", 1.0)]);
    let params = SyncParams::default().with_ntiids(ntiids(&["A"]));
    let result = sync(&library, &params).await.unwrap();
    assert!(result.added.is_empty());
    assert_eq!(result.modified, ntiids(&["A"]));
    assert!(!library.contains("B"));
}

#[tokio::test]
async fn test_opted_out_package_is_never_touched() {
    let (library, _enumeration, sink) = library_with(vec![]);
    sync(&library, &SyncParams::default()).await.unwrap();
    library.add(package("A", 1.0).without_auto_sync()).unwrap();

    // The enumeration does not know A; it is still not removed.
    let result = sync(&library, &SyncParams::default()).await.unwrap();
    assert!(result.removed.is_empty());
    assert!(library.contains("A"));
    assert!(sink.labels().contains(&"Unmodified:A".to_string()));
}

#[tokio::test]
async fn test_replace_checks_identity() {
    let (library, _enumeration, sink) = library_with(vec![package("A", 1.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();
    let old = library.get("A").unwrap();

    let err = library.replace("A", package("Z", 2.0)).unwrap_err();
    assert_eq!(err.code(), Some(105));
    assert!(Arc::ptr_eq(&library.get("A").unwrap(), &old));

    let err = library.replace("missing", package("missing", 2.0)).unwrap_err();
    assert!(matches!(err, SyncError::PackageNotFound(_)));

    sink.clear();
    let new = library.replace("A", package("A", 2.0)).unwrap();
    assert_eq!(sink.labels(), vec!["Replaced:A"]);
    assert!(Arc::ptr_eq(&library.get("A").unwrap(), &new));
    assert_eq!(old.owner(), None);
    assert!(!library.registry().is_registered(old.instance(), "A"));
    assert!(library.registry().is_registered(new.instance(), "A.ch1"));
}

#[tokio::test]
async fn test_direct_add_and_remove() {
    let (library, _enumeration, sink) = library_with(vec![]);

    let added = library.add(package("A", 1.0)).unwrap();
    assert!(library.is_synced());
    assert_eq!(added.owner().as_deref(), Some("global"));
    assert!(matches!(
        library.add(package("A", 2.0)),
        Err(SyncError::DuplicatePackage { .. })
    ));

    let removed = library.remove("A").unwrap();
    assert!(Arc::ptr_eq(&added, &removed));
    assert!(library.content_unit("A.ch1").is_none());
    assert_eq!(removed.owner(), None);
    assert!(matches!(
        library.remove("A"),
        Err(SyncError::PackageNotFound(_))
    ));
    assert_eq!(sink.labels(), vec!["Created:A", "Added:A", "Removed:A"]);
}

#[tokio::test]
async fn test_reset_returns_library_to_never_synced() {
    let (library, _enumeration, sink) = library_with(vec![package("A", 1.0), package("B", 1.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();
    assert_eq!(library.registry().len(), 4);
    sink.clear();

    library.reset_content_packages();
    assert!(!library.is_synced());
    assert_eq!(library.last_modified(), -1.0);
    assert_eq!(sink.count("Removed"), 2);
    assert!(library.registry().is_empty());

    let result = sync(&library, &SyncParams::default()).await.unwrap();
    assert_eq!(result.added, ntiids(&["A", "B"]));

    // Resetting twice only fires once.
    library.reset_content_packages();
    sink.clear();
    library.reset_content_packages();
    assert!(sink.labels().is_empty());
}

#[tokio::test]
async fn test_remove_invalid_content_units() {
    let (library, _enumeration, _sink) = library_with(vec![package("A", 1.0), package("B", 1.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();

    let a = library.get("A").unwrap();
    library.registry().unregister_package(&a);

    let mut removed = library.remove_invalid_content_units();
    removed.sort();
    assert_eq!(removed, ntiids(&["A", "A.ch1"]));
    assert!(library.content_unit("A.ch1").is_none());
    assert!(library.content_unit("B.ch1").is_some());
    assert!(library.contains("A"), "packages themselves stay");
}

#[tokio::test]
async fn test_unit_queries() {
    let tree = ContentUnit::new("P1")
        .with_child(
            ContentUnit::new("P1.ch1")
                .with_embedded("E1")
                .with_child(ContentUnit::new("P1.ch1.s1")),
        )
        .with_child(ContentUnit::new("P1.ch2").with_embedded("E1"));
    let (library, _enumeration, _sink) = library_with(vec![ContentPackage::new(tree, 1.0)]);
    sync(&library, &SyncParams::default()).await.unwrap();

    assert_eq!(
        library.path_to_ntiid("P1.ch1.s1"),
        Some(ntiids(&["P1", "P1.ch1", "P1.ch1.s1"]))
    );
    assert_eq!(library.path_to_ntiid("P1"), Some(ntiids(&["P1"])));
    assert_eq!(library.path_to_ntiid("nope"), None);

    assert_eq!(
        library.children_of_ntiid("P1"),
        ntiids(&["E1", "P1.ch1.s1", "P1.ch1", "E1", "P1.ch2"])
    );
    assert!(library.children_of_ntiid("P1.ch1.s1").is_empty());
    assert!(library.children_of_ntiid("nope").is_empty());

    assert_eq!(
        library.paths_to_embedded_ntiid("E1"),
        vec![ntiids(&["P1", "P1.ch1"]), ntiids(&["P1", "P1.ch2"])]
    );
    assert!(library.paths_to_embedded_ntiid("E2").is_empty());

    let unit = library.content_unit("P1.ch2").unwrap();
    assert_eq!(unit.unit().ordinal, 2);
    assert_eq!(unit.package().ntiid(), "P1");
    assert_eq!(library.content_units_by_ntiid().len(), 4);
    assert!(library.content_unit("").is_none());
}
