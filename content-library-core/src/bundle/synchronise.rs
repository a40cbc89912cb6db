//! Bundle synchronisation: reconciles a bundle library with the descriptor
//! files found under a bucket.
//!
//! Each immediate sub-bucket holding a [`BUNDLE_META_NAME`] key is one
//! bundle. New NTIIDs become new bundles; known NTIIDs whose descriptor is
//! strictly newer than the bundle are field-diffed in place. Bundles whose
//! descriptor disappeared are left alone: deletion is an explicit
//! [`BundleLibrary::remove`].
//!
//! Field updates only touch attributes whose value actually differs, so an
//! unchanged descriptor never produces a `BundleModified` event.

use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::meta::{json_kind, string_list, BundleMetaInfo, BUNDLE_META_NAME};
use super::{BundleHandle, BundleLibrary, ContentPackageBundle, VendorInfo};
use crate::error::SyncError;
use crate::events::LibraryEvent;
use crate::hierarchy::{HierarchyBucket, HierarchyKey, HierarchyNode};
use crate::library::ContentPackageLibrary;
use crate::ntiid::Ntiid;
use crate::wref::PackageRef;

/// Sibling of the descriptor holding free-form vendor data.
pub const VENDOR_INFO_NAME: &str = "vendor_info.json";

/// Descriptor fields never copied onto a bundle.
const BOOKKEEPING_FIELDS: [&str; 4] = ["lastModified", "createdTime", "modified", "created"];

/// What one bundle sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BundleSyncResults {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Added")]
    pub added: Vec<Ntiid>,
    #[serde(rename = "Updated")]
    pub updated: Vec<Ntiid>,
}

impl BundleSyncResults {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }
}

/// One validated descriptor value, ready to be compared and applied.
#[derive(Debug, Clone)]
enum FieldUpdate {
    Ntiid(Ntiid),
    Title(String),
    Description(String),
    Byline(String),
    Creators(Vec<String>),
    Subjects(Vec<String>),
    RestrictedAccess(bool),
    ContentPackages(BTreeSet<PackageRef>),
}

impl FieldUpdate {
    fn parse(field: &str, value: &Value, meta: &BundleMetaInfo) -> Result<Option<Self>, SyncError> {
        let text = || match value {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => {
                debug!(field, found = json_kind(other), "[BUNDLES] Wrong field type");
                Err(SyncError::InvalidBundleField {
                    field: field.to_string(),
                    expected: "string",
                })
            }
        };

        let update = match field {
            "ntiid" => return Ok(meta.ntiid.clone().map(FieldUpdate::Ntiid)),
            "title" => FieldUpdate::Title(text()?),
            "description" => FieldUpdate::Description(text()?),
            "byline" => FieldUpdate::Byline(text()?),
            "creators" => FieldUpdate::Creators(string_list(field, value)?),
            "subjects" => FieldUpdate::Subjects(string_list(field, value)?),
            "RestrictedAccess" => match value {
                Value::Bool(b) => FieldUpdate::RestrictedAccess(*b),
                _ => {
                    return Err(SyncError::InvalidBundleField {
                        field: field.to_string(),
                        expected: "bool",
                    })
                }
            },
            "ContentPackages" => {
                FieldUpdate::ContentPackages(meta.content_packages.clone().unwrap_or_default())
            }
            // not a bundle field
            _ => return Ok(None),
        };
        Ok(Some(update))
    }

    fn name(&self) -> &'static str {
        match self {
            FieldUpdate::Ntiid(_) => "ntiid",
            FieldUpdate::Title(_) => "title",
            FieldUpdate::Description(_) => "description",
            FieldUpdate::Byline(_) => "byline",
            FieldUpdate::Creators(_) => "creators",
            FieldUpdate::Subjects(_) => "subjects",
            FieldUpdate::RestrictedAccess(_) => "RestrictedAccess",
            FieldUpdate::ContentPackages(_) => "ContentPackages",
        }
    }

    /// Sets the attribute when it differs. Returns whether it changed.
    fn apply(self, bundle: &mut ContentPackageBundle, content_library: &ContentPackageLibrary) -> bool {
        fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        }

        match self {
            FieldUpdate::Ntiid(ntiid) => set(&mut bundle.ntiid, ntiid),
            FieldUpdate::Title(value) => set(&mut bundle.title, value),
            FieldUpdate::Description(value) => set(&mut bundle.description, value),
            FieldUpdate::Byline(value) => set(&mut bundle.byline, value),
            FieldUpdate::Creators(value) => set(&mut bundle.creators, value),
            FieldUpdate::Subjects(value) => set(&mut bundle.subjects, value),
            FieldUpdate::RestrictedAccess(value) => set(&mut bundle.restricted_access, value),
            FieldUpdate::ContentPackages(refs) => set_bundle_packages(bundle, refs, content_library),
        }
    }
}

/// Compares by NTIID set so resolution state never counts as a change. When
/// the sets differ, references to editable packages the bundle already has
/// are kept: the descriptor only knows about packages sync manages.
/// Editability is looked up in `content_library` now, since the package a
/// reference was resolved to may have been replaced since.
fn set_bundle_packages(
    bundle: &mut ContentPackageBundle,
    refs: BTreeSet<PackageRef>,
    content_library: &ContentPackageLibrary,
) -> bool {
    if bundle.content_packages == refs {
        return false;
    }
    let mut packages = refs;
    for current in &bundle.content_packages {
        if current
            .resolve(content_library)
            .is_some_and(|p| p.editable)
        {
            packages.insert(current.clone());
        }
    }
    if packages == bundle.content_packages {
        return false;
    }
    let added: Vec<&Ntiid> = packages
        .difference(&bundle.content_packages)
        .map(PackageRef::ntiid)
        .collect();
    let removed: Vec<&Ntiid> = bundle
        .content_packages
        .difference(&packages)
        .map(PackageRef::ntiid)
        .collect();
    info!(bundle = %bundle.ntiid, added = ?added, removed = ?removed, "[BUNDLES] Modifying bundle packages");
    bundle.content_packages = packages;
    true
}

/// Validates every bundle field of the descriptor, skipping `excluded` and
/// bookkeeping fields. Nothing is applied.
fn field_updates(meta: &BundleMetaInfo, excluded: &[&str]) -> Result<Vec<FieldUpdate>, SyncError> {
    let mut updates = Vec::new();
    for (field, value) in &meta.fields {
        if excluded.contains(&field.as_str()) || BOOKKEEPING_FIELDS.contains(&field.as_str()) {
            continue;
        }
        if let Some(update) = FieldUpdate::parse(field, value, meta)? {
            updates.push(update);
        }
    }
    Ok(updates)
}

fn apply_field_updates(
    bundle: &mut ContentPackageBundle,
    meta: &BundleMetaInfo,
    updates: Vec<FieldUpdate>,
    content_library: &ContentPackageLibrary,
) -> Vec<String> {
    let mut changed = Vec::new();
    for update in updates {
        let name = update.name();
        if update.apply(bundle, content_library) {
            changed.push(name.to_string());
        }
    }

    if let Some(bucket_path) = &meta.bucket_path {
        if bundle.root.as_deref() != Some(bucket_path.as_str()) {
            bundle.root = Some(bucket_path.clone());
            changed.push("root".to_string());
        }
    }

    if !changed.is_empty() {
        bundle.update_last_modified(meta.last_modified);
    } else {
        bundle.update_last_modified_if_greater(meta.last_modified);
    }
    changed
}

/// Copies the descriptor's bundle fields onto `bundle`, touching only the
/// ones that differ. Fields in `excluded` are skipped. Every value is
/// validated before anything is set. Returns the names of the changed
/// fields (`root` included when the descriptor moved).
pub fn synchronize_bundle(
    bundle: &mut ContentPackageBundle,
    meta: &BundleMetaInfo,
    content_library: &ContentPackageLibrary,
    excluded: &[&str],
) -> Result<Vec<String>, SyncError> {
    let updates = field_updates(meta, excluded)?;
    Ok(apply_field_updates(bundle, meta, updates, content_library))
}

/// Reads [`VENDOR_INFO_NAME`] from `bucket`, `None` when there is none.
async fn read_vendor_info(bucket: &dyn HierarchyBucket) -> Result<Option<VendorInfo>, SyncError> {
    let key = match bucket.get_child_named(VENDOR_INFO_NAME).await? {
        Some(HierarchyNode::Key(key)) => key,
        _ => return Ok(None),
    };
    match key.read_contents_as_json().await? {
        Value::Object(data) => Ok(Some(VendorInfo {
            data,
            created_time: key.created_time(),
            last_modified: key.last_modified(),
        })),
        other => Err(SyncError::InvalidDescriptor {
            key: key.path(),
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

fn apply_vendor_info(
    library: &BundleLibrary,
    bundle: &BundleHandle,
    vendor_info: Option<VendorInfo>,
) -> bool {
    let Some(vendor_info) = vendor_info else {
        bundle.write().vendor_info.clear();
        return false;
    };
    {
        let mut guard = bundle.write();
        if vendor_info.last_modified <= guard.vendor_info.last_modified {
            return false;
        }
        guard.vendor_info = vendor_info;
    }
    library.notify(LibraryEvent::BundleVendorInfoSynchronized(bundle.clone()));
    true
}

/// Mirrors [`VENDOR_INFO_NAME`] from `bucket` into the bundle's vendor info:
/// copied when newer than what the bundle has, cleared when absent.
/// Returns whether new vendor data was copied.
pub async fn synchronize_bundle_vendor_info(
    library: &BundleLibrary,
    bundle: &BundleHandle,
    bucket: &dyn HierarchyBucket,
) -> Result<bool, SyncError> {
    let vendor_info = read_vendor_info(bucket).await?;
    Ok(apply_vendor_info(library, bundle, vendor_info))
}

/// A descriptor read and validated, with its vendor data, before anything
/// is mutated.
struct Candidate {
    meta: BundleMetaInfo,
    updates: Vec<FieldUpdate>,
    vendor_info: Option<VendorInfo>,
}

async fn read_candidate(
    bucket: Arc<dyn HierarchyBucket>,
    key: Arc<dyn HierarchyKey>,
    content_library: &ContentPackageLibrary,
) -> Result<Candidate, SyncError> {
    let meta = BundleMetaInfo::read(key, Some(content_library), true).await?;
    let updates = field_updates(&meta, &[])?;
    let vendor_info = read_vendor_info(bucket.as_ref()).await?;
    Ok(Candidate {
        meta,
        updates,
        vendor_info,
    })
}

/// Syncs every bundle descriptor below `bucket` into `bundle_library`,
/// resolving package references against `content_library`.
///
/// Every descriptor (and its vendor data) is read and validated before
/// anything is mutated; one unreadable or invalid descriptor fails the whole
/// pass and leaves the bundle library untouched.
pub async fn sync_from_bucket(
    bundle_library: &BundleLibrary,
    content_library: &ContentPackageLibrary,
    bucket: &dyn HierarchyBucket,
) -> Result<BundleSyncResults, SyncError> {
    info!(library = %bundle_library.name(), bucket = %bucket.path(), "[BUNDLES] Starting bundle sync");

    let mut descriptors = Vec::new();
    for child in bucket.enumerate_children().await? {
        let HierarchyNode::Bucket(child) = child else {
            continue;
        };
        if let Some(HierarchyNode::Key(key)) = child.get_child_named(BUNDLE_META_NAME).await? {
            descriptors.push((child, key));
        }
    }

    let candidates = try_join_all(
        descriptors
            .into_iter()
            .map(|(child, key)| read_candidate(child, key, content_library)),
    )
    .await
    .map_err(|e| {
        error!(library = %bundle_library.name(), error = %e, "[BUNDLES][ERROR] Failed to read bundle descriptors");
        e
    })?;

    // One bundle per NTIID; the first descriptor in bucket order wins.
    let mut by_ntiid: BTreeMap<Ntiid, Candidate> = BTreeMap::new();
    for candidate in candidates {
        let Some(ntiid) = candidate.meta.ntiid.clone() else {
            continue;
        };
        if by_ntiid.contains_key(&ntiid) {
            warn!(bundle = %ntiid, key = ?candidate.meta.key_path, "[BUNDLES] Ignoring duplicate bundle descriptor");
            continue;
        }
        by_ntiid.insert(ntiid, candidate);
    }

    let mut to_add = Vec::new();
    let mut to_update = Vec::new();
    for (ntiid, candidate) in by_ntiid {
        match bundle_library.get_local(ntiid.as_str()) {
            None => to_add.push((ntiid, candidate)),
            Some(bundle) => {
                if candidate.meta.last_modified > bundle.read().last_modified {
                    to_update.push((bundle, candidate));
                }
            }
        }
    }

    let mut results = BundleSyncResults {
        name: bundle_library.name().to_string(),
        ..Default::default()
    };

    if !to_add.is_empty() {
        info!(library = %bundle_library.name(), bundles = ?to_add.iter().map(|(n, _)| n).collect::<Vec<_>>(), "[BUNDLES] Adding bundles");
    }
    for (ntiid, candidate) in to_add {
        let mut bundle = ContentPackageBundle::new(ntiid.clone());
        bundle.created_time = candidate.meta.created_time;
        apply_field_updates(&mut bundle, &candidate.meta, candidate.updates, content_library);
        let handle = bundle.into_handle();
        apply_vendor_info(bundle_library, &handle, candidate.vendor_info);
        bundle_library.notify(LibraryEvent::BundleCreated(handle.clone()));
        bundle_library.insert(handle)?;
        results.added.push(ntiid);
    }

    if !to_update.is_empty() {
        info!(library = %bundle_library.name(), bundles = ?to_update.iter().map(|(_, c)| &c.meta.ntiid).collect::<Vec<_>>(), "[BUNDLES] Updating bundles");
    }
    for (handle, candidate) in to_update {
        let changed = apply_field_updates(
            &mut handle.write(),
            &candidate.meta,
            candidate.updates,
            content_library,
        );
        apply_vendor_info(bundle_library, &handle, candidate.vendor_info);
        if !changed.is_empty() {
            bundle_library.notify(LibraryEvent::BundleModified {
                bundle: handle.clone(),
                changed_fields: changed,
            });
        }
        let ntiid = handle.read().ntiid.clone();
        results.updated.push(ntiid);
    }

    if results.is_empty() {
        info!(library = %bundle_library.name(), "[BUNDLES] Nothing to do");
    } else {
        bundle_library.notify(LibraryEvent::BundleLibraryModifiedOnSync {
            added: results.added.clone(),
            updated: results.updated.clone(),
        });
    }
    Ok(results)
}
