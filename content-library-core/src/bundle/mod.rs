//! # bundle: content package bundles and bundle libraries
//!
//! A bundle is a displayable grouping of content packages. It references
//! its packages through [`PackageRef`]s and never owns them. Bundles are
//! mutated in place by the bundle synchroniser, so they are shared as
//! [`BundleHandle`]s.
//!
//! A [`BundleLibrary`] layers like a package library: reads fall through to
//! the parent on a local miss, writes stay local.

pub mod meta;
pub mod synchronise;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::events::{EventSink, LibraryEvent, TracingEventSink};
use crate::library::ContentPackageLibrary;
use crate::ntiid::Ntiid;
use crate::time;
use crate::unit::PackageHandle;
use crate::wref::PackageRef;

pub use meta::{BundleMetaInfo, BUNDLE_META_NAME};
pub use synchronise::{
    sync_from_bucket, synchronize_bundle, synchronize_bundle_vendor_info, BundleSyncResults,
    VENDOR_INFO_NAME,
};

pub type BundleHandle = Arc<RwLock<ContentPackageBundle>>;

/// Free-form vendor data kept alongside a bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorInfo {
    pub data: Map<String, Value>,
    pub created_time: f64,
    pub last_modified: f64,
}

impl VendorInfo {
    pub fn clear(&mut self) {
        self.data.clear();
        self.created_time = 0.0;
        self.last_modified = 0.0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentPackageBundle {
    pub ntiid: Ntiid,
    pub title: String,
    pub description: String,
    pub byline: String,
    pub creators: Vec<String>,
    pub subjects: Vec<String>,
    pub restricted_access: bool,
    pub content_packages: BTreeSet<PackageRef>,
    /// Path of the bucket holding this bundle's descriptor.
    pub root: Option<String>,
    pub created_time: f64,
    pub last_modified: f64,
    pub vendor_info: VendorInfo,
}

impl ContentPackageBundle {
    pub fn new(ntiid: impl Into<Ntiid>) -> Self {
        Self {
            ntiid: ntiid.into(),
            ..Self::default()
        }
    }

    pub fn into_handle(self) -> BundleHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Returns `false` if the package was already referenced.
    pub fn add_package(&mut self, package: &PackageHandle) -> bool {
        self.content_packages.insert(PackageRef::to_package(package))
    }

    pub fn add_package_ref(&mut self, package: PackageRef) -> bool {
        self.content_packages.insert(package)
    }

    pub fn remove_package(&mut self, ntiid: &str) -> bool {
        self.content_packages.remove(&PackageRef::pending(ntiid))
    }

    pub fn package_ntiids(&self) -> Vec<Ntiid> {
        self.content_packages
            .iter()
            .map(|r| r.ntiid().clone())
            .collect()
    }

    /// The referenced packages `library` can currently resolve; the rest are
    /// skipped.
    pub fn resolve_packages(&self, library: &ContentPackageLibrary) -> Vec<PackageHandle> {
        self.content_packages
            .iter()
            .filter_map(|r| r.resolve(library))
            .collect()
    }

    /// Like [`Self::resolve_packages`] but every reference must resolve.
    pub fn resolve_packages_strict(
        &self,
        library: &ContentPackageLibrary,
    ) -> Result<Vec<PackageHandle>, SyncError> {
        self.content_packages
            .iter()
            .map(|r| {
                r.resolve(library)
                    .ok_or_else(|| SyncError::MissingPackageReference {
                        ntiid: r.ntiid().clone(),
                    })
            })
            .collect()
    }

    pub fn update_last_modified(&mut self, last_modified: f64) {
        self.last_modified = last_modified;
    }

    pub fn update_last_modified_if_greater(&mut self, last_modified: f64) {
        if last_modified > self.last_modified {
            self.last_modified = last_modified;
        }
    }
}

#[derive(Debug, Default)]
struct BundleLibraryState {
    bundles: BTreeMap<Ntiid, BundleHandle>,
    last_modified: f64,
}

pub struct BundleLibrary {
    name: String,
    parent: Option<Arc<BundleLibrary>>,
    sink: Arc<dyn EventSink>,
    state: RwLock<BundleLibraryState>,
}

impl BundleLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            sink: Arc::new(TracingEventSink),
            state: RwLock::new(BundleLibraryState::default()),
        }
    }

    pub fn with_parent(mut self, parent: Arc<BundleLibrary>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<BundleLibrary>> {
        self.parent.as_ref()
    }

    pub fn last_modified(&self) -> f64 {
        self.state.read().last_modified
    }

    /// Number of bundles stored in this layer.
    pub fn len(&self) -> usize {
        self.state.read().bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, ntiid: &str) -> Option<BundleHandle> {
        self.get_local(ntiid)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get(ntiid)))
    }

    pub fn get_local(&self, ntiid: &str) -> Option<BundleHandle> {
        self.state.read().bundles.get(ntiid).cloned()
    }

    pub fn contains(&self, ntiid: &str) -> bool {
        self.get(ntiid).is_some()
    }

    /// Ignores parents; the synchroniser only ever manages this layer.
    pub fn contains_local(&self, ntiid: &str) -> bool {
        self.state.read().bundles.contains_key(ntiid)
    }

    /// Local bundles first, then (optionally) every parent bundle not
    /// shadowed by a local one.
    pub fn bundles(&self, include_parents: bool) -> Vec<BundleHandle> {
        let local: Vec<(Ntiid, BundleHandle)> = self
            .state
            .read()
            .bundles
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut seen: BTreeSet<Ntiid> = local.iter().map(|(k, _)| k.clone()).collect();
        let mut result: Vec<BundleHandle> = local.into_iter().map(|(_, v)| v).collect();

        if let (true, Some(parent)) = (include_parents, &self.parent) {
            for bundle in parent.bundles(true) {
                let ntiid = bundle.read().ntiid.clone();
                if seen.insert(ntiid) {
                    result.push(bundle);
                }
            }
        }
        result
    }

    pub fn add(&self, bundle: ContentPackageBundle) -> Result<BundleHandle, SyncError> {
        let handle = bundle.into_handle();
        self.insert(handle.clone())?;
        Ok(handle)
    }

    /// Stores an existing handle and fires `BundleAdded`.
    pub fn insert(&self, handle: BundleHandle) -> Result<(), SyncError> {
        let ntiid = handle.read().ntiid.clone();
        {
            let mut state = self.state.write();
            if state.bundles.contains_key(&ntiid) {
                return Err(SyncError::DuplicateBundle(ntiid));
            }
            state.bundles.insert(ntiid.clone(), handle.clone());
            state.last_modified = time::now();
        }
        debug!(library = %self.name, bundle = %ntiid, "[BUNDLES] Added bundle");
        self.notify(LibraryEvent::BundleAdded(handle));
        Ok(())
    }

    /// Explicitly deletes a bundle from this layer. Sync never does this.
    pub fn remove(&self, ntiid: &str) -> Result<BundleHandle, SyncError> {
        let handle = {
            let mut state = self.state.write();
            let handle = state
                .bundles
                .remove(ntiid)
                .ok_or_else(|| SyncError::BundleNotFound(Ntiid::from(ntiid)))?;
            state.last_modified = time::now();
            handle
        };
        info!(library = %self.name, bundle = %ntiid, "[BUNDLES] Removed bundle");
        self.notify(LibraryEvent::BundleRemoved(handle.clone()));
        Ok(handle)
    }

    pub(crate) fn notify(&self, event: LibraryEvent) {
        self.sink.notify(&self.name, &event);
    }
}

impl fmt::Debug for BundleLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleLibrary")
            .field("name", &self.name)
            .field("bundles", &self.len())
            .field("parent", &self.parent.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}
