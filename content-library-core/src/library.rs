//! # library: layered content package libraries
//!
//! A [`ContentPackageLibrary`] stores packages by NTIID plus two derived
//! indexes: every unit of every package by NTIID, and every embedded
//! container NTIID to the units that embed it. A library may have a parent;
//! reads fall through to the parent on a local miss, writes never do.
//!
//! A library starts *never synced*. That state is distinct from "synced and
//! empty": [`ContentPackageLibrary::last_modified`] reports `-1.0` and the
//! first sync always reports what it found. The sync engine itself lives in
//! [`crate::synchronise`].
//!
//! The mutation helpers here take the state lock per package and deliver the
//! matching event only after releasing it.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::enumeration::ContentPackageEnumeration;
use crate::error::SyncError;
use crate::events::{EventSink, LibraryEvent, TracingEventSink};
use crate::identity::IdentityRegistry;
use crate::ntiid::Ntiid;
use crate::results::LibrarySyncResults;
use crate::time;
use crate::unit::{ContentPackage, ContentUnit, PackageHandle};

/// Where a unit lives: its package and the child-index path from the root.
#[derive(Debug, Clone)]
struct UnitLocation {
    package: PackageHandle,
    path: Vec<usize>,
}

/// A borrowed view of one indexed unit. Keeps its package alive.
#[derive(Clone)]
pub struct UnitRef {
    package: PackageHandle,
    path: Vec<usize>,
}

impl UnitRef {
    fn new(location: &UnitLocation) -> Self {
        Self {
            package: location.package.clone(),
            path: location.path.clone(),
        }
    }

    pub fn unit(&self) -> &ContentUnit {
        // Paths come from flattening this same immutable tree.
        self.package
            .unit()
            .descendant(&self.path)
            .unwrap_or_else(|| self.package.unit())
    }

    pub fn ntiid(&self) -> &Ntiid {
        &self.unit().ntiid
    }

    pub fn package(&self) -> &PackageHandle {
        &self.package
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Units from the package root down to and including this unit.
    pub fn lineage(&self) -> Vec<&ContentUnit> {
        let root = self.package.unit();
        (0..=self.path.len())
            .filter_map(|depth| root.descendant(&self.path[..depth]))
            .collect()
    }
}

impl fmt::Debug for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitRef")
            .field("ntiid", self.ntiid())
            .field("package", self.package.ntiid())
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct LibraryIndex {
    packages: BTreeMap<Ntiid, PackageHandle>,
    units: HashMap<Ntiid, UnitLocation>,
    embedded: HashMap<Ntiid, BTreeSet<Ntiid>>,
}

impl LibraryIndex {
    fn record_units(&mut self, package: &PackageHandle) {
        for (path, unit) in package.unit().flatten() {
            for embedded in &unit.embedded_container_ntiids {
                self.embedded
                    .entry(embedded.clone())
                    .or_default()
                    .insert(unit.ntiid.clone());
            }
            self.units.insert(
                unit.ntiid.clone(),
                UnitLocation {
                    package: package.clone(),
                    path,
                },
            );
        }
    }

    /// Drops only the entries that still point into `package`; a unit NTIID
    /// re-recorded by another package is left alone.
    fn unrecord_units(&mut self, package: &PackageHandle) {
        for (_, unit) in package.unit().flatten() {
            let owned = self
                .units
                .get(&unit.ntiid)
                .is_some_and(|loc| Arc::ptr_eq(&loc.package, package));
            if owned {
                self.units.remove(&unit.ntiid);
                self.forget_embedding(unit);
            }
        }
    }

    fn forget_embedding(&mut self, unit: &ContentUnit) {
        for embedded in &unit.embedded_container_ntiids {
            if let Some(units) = self.embedded.get_mut(embedded) {
                units.remove(&unit.ntiid);
                if units.is_empty() {
                    self.embedded.remove(embedded);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct LibraryState {
    /// `None` until the first sync (or after a reset).
    pub(crate) index: Option<LibraryIndex>,
    /// The enumeration's `last_modified` as of the last effective sync.
    pub(crate) enumeration_last_modified: f64,
    /// Time of the last direct add or remove.
    pub(crate) last_modified: f64,
    pub(crate) last_synchronized: f64,
}

/// A library of content packages backed by one enumeration.
pub struct ContentPackageLibrary {
    name: String,
    enumeration: Arc<dyn ContentPackageEnumeration>,
    parent: Option<Arc<ContentPackageLibrary>>,
    sink: Arc<dyn EventSink>,
    registry: Arc<IdentityRegistry>,
    pub(crate) state: RwLock<LibraryState>,
}

impl ContentPackageLibrary {
    /// A root library with its own identity registry that logs its events.
    pub fn new(name: impl Into<String>, enumeration: Arc<dyn ContentPackageEnumeration>) -> Self {
        Self {
            name: name.into(),
            enumeration,
            parent: None,
            sink: Arc::new(TracingEventSink),
            registry: Arc::new(IdentityRegistry::new()),
            state: RwLock::new(LibraryState::default()),
        }
    }

    pub fn with_parent(mut self, parent: Arc<ContentPackageLibrary>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_registry(mut self, registry: Arc<IdentityRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ContentPackageLibrary>> {
        self.parent.as_ref()
    }

    pub fn enumeration(&self) -> &Arc<dyn ContentPackageEnumeration> {
        &self.enumeration
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn is_synced(&self) -> bool {
        self.state.read().index.is_some()
    }

    /// `-1.0` when never synced; otherwise the later of the enumeration's
    /// timestamp at the last effective sync and the last direct mutation.
    pub fn last_modified(&self) -> f64 {
        let state = self.state.read();
        if state.index.is_none() {
            return -1.0;
        }
        state.enumeration_last_modified.max(state.last_modified)
    }

    pub fn created_time(&self) -> f64 {
        self.enumeration.created_time()
    }

    pub fn last_synchronized(&self) -> f64 {
        self.state.read().last_synchronized
    }

    /// Number of packages stored in this layer (parents not included).
    pub fn len(&self) -> usize {
        self.state
            .read()
            .index
            .as_ref()
            .map_or(0, |index| index.packages.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- layered reads ---

    pub fn get(&self, ntiid: &str) -> Option<PackageHandle> {
        self.get_local(ntiid)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get(ntiid)))
    }

    pub fn contains(&self, ntiid: &str) -> bool {
        self.get(ntiid).is_some()
    }

    pub fn get_local(&self, ntiid: &str) -> Option<PackageHandle> {
        self.state
            .read()
            .index
            .as_ref()
            .and_then(|index| index.packages.get(ntiid).cloned())
    }

    /// Packages stored in this layer, ordered by NTIID.
    pub fn local_packages(&self) -> Vec<PackageHandle> {
        self.state
            .read()
            .index
            .as_ref()
            .map(|index| index.packages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every visible package: this layer overlaid on the parent's visible
    /// set, local entries shadowing the parent's.
    pub fn content_packages(&self) -> Vec<PackageHandle> {
        let mut visible: BTreeMap<Ntiid, PackageHandle> = self
            .parent
            .as_ref()
            .map(|parent| {
                parent
                    .content_packages()
                    .into_iter()
                    .map(|p| (p.ntiid().clone(), p))
                    .collect()
            })
            .unwrap_or_default();
        for package in self.local_packages() {
            visible.insert(package.ntiid().clone(), package);
        }
        visible.into_values().collect()
    }

    /// Every visible unit by NTIID, local entries shadowing the parent's.
    pub fn content_units_by_ntiid(&self) -> BTreeMap<Ntiid, UnitRef> {
        let mut units = self
            .parent
            .as_ref()
            .map(|parent| parent.content_units_by_ntiid())
            .unwrap_or_default();
        if let Some(index) = self.state.read().index.as_ref() {
            for (ntiid, location) in &index.units {
                units.insert(ntiid.clone(), UnitRef::new(location));
            }
        }
        units
    }

    pub fn content_unit(&self, ntiid: &str) -> Option<UnitRef> {
        if ntiid.is_empty() {
            return None;
        }
        let local = self
            .state
            .read()
            .index
            .as_ref()
            .and_then(|index| index.units.get(ntiid).map(UnitRef::new));
        local.or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.content_unit(ntiid))
        })
    }

    /// NTIIDs from the package root down to the unit, or `None` if unknown.
    pub fn path_to_ntiid(&self, ntiid: &str) -> Option<Vec<Ntiid>> {
        self.content_unit(ntiid).map(|unit| {
            unit.lineage()
                .into_iter()
                .map(|u| u.ntiid.clone())
                .collect()
        })
    }

    /// Every NTIID below the unit: descendants and the embedded containers of
    /// the unit and its descendants. The unit itself is excluded.
    pub fn children_of_ntiid(&self, ntiid: &str) -> Vec<Ntiid> {
        fn collect(unit: &ContentUnit, out: &mut Vec<Ntiid>) {
            out.extend(unit.embedded_container_ntiids.iter().cloned());
            for child in &unit.children {
                collect(child, out);
                out.push(child.ntiid.clone());
            }
        }

        let mut result = Vec::new();
        if let Some(unit) = self.content_unit(ntiid) {
            collect(unit.unit(), &mut result);
        }
        result
    }

    /// Paths to every unit that embeds `ntiid`. Falls through to the parent
    /// only when this layer knows of no embedding.
    pub fn paths_to_embedded_ntiid(&self, ntiid: &str) -> Vec<Vec<Ntiid>> {
        let embedders: Vec<Ntiid> = self
            .state
            .read()
            .index
            .as_ref()
            .and_then(|index| index.embedded.get(ntiid))
            .map(|units| units.iter().cloned().collect())
            .unwrap_or_default();

        let paths: Vec<Vec<Ntiid>> = embedders
            .iter()
            .filter_map(|unit| self.path_to_ntiid(unit.as_str()))
            .collect();
        if !paths.is_empty() {
            return paths;
        }
        self.parent
            .as_ref()
            .map(|parent| parent.paths_to_embedded_ntiid(ntiid))
            .unwrap_or_default()
    }

    // --- direct mutation (local layer only) ---

    /// Adds a package to this layer. A never-synced library becomes synced
    /// (and empty apart from this package).
    pub fn add(&self, package: ContentPackage) -> Result<PackageHandle, SyncError> {
        if self.get_local(package.ntiid().as_str()).is_some() {
            return Err(SyncError::DuplicatePackage {
                ntiid: package.ntiid().clone(),
            });
        }
        {
            let mut state = self.state.write();
            state.last_modified = time::now();
            state.index.get_or_insert_with(LibraryIndex::default);
        }
        let package = Arc::new(package);
        self.do_add(&package, None);
        Ok(package)
    }

    pub fn remove(&self, ntiid: &str) -> Result<PackageHandle, SyncError> {
        let package = self
            .get_local(ntiid)
            .ok_or_else(|| SyncError::PackageNotFound(Ntiid::from(ntiid)))?;
        self.state.write().last_modified = time::now();
        self.do_remove(&package, None);
        Ok(package)
    }

    /// Swaps the package stored under `old_ntiid` for `package`.
    pub fn replace(
        &self,
        old_ntiid: &str,
        package: ContentPackage,
    ) -> Result<PackageHandle, SyncError> {
        let old = self
            .get_local(old_ntiid)
            .ok_or_else(|| SyncError::PackageNotFound(Ntiid::from(old_ntiid)))?;
        let package = Arc::new(package);
        self.do_update(&package, &old, None)?;
        Ok(package)
    }

    /// Drops every package stored in this layer, firing `Removed` for each,
    /// and returns the library to the never-synced state.
    pub fn reset_content_packages(&self) {
        if !self.is_synced() {
            return;
        }
        let packages = self.local_packages();
        warn!(library = %self.name, packages = packages.len(), "[SYNC] Resetting library");
        for package in &packages {
            self.notify(LibraryEvent::Removed(package.clone()));
            self.registry.unregister_package(package);
            package.set_owner(None);
        }
        self.state.write().index = None;
    }

    /// Drops unit-index entries whose unit no longer has an identity
    /// registration, here and in every parent. Returns the dropped NTIIDs.
    pub fn remove_invalid_content_units(&self) -> Vec<Ntiid> {
        let mut removed = Vec::new();
        {
            let mut state = self.state.write();
            if let Some(index) = state.index.as_mut() {
                let invalid: Vec<Ntiid> = index
                    .units
                    .iter()
                    .filter(|(ntiid, loc)| {
                        !self
                            .registry
                            .is_registered(loc.package.instance(), ntiid.as_str())
                    })
                    .map(|(ntiid, _)| ntiid.clone())
                    .collect();
                for ntiid in invalid {
                    if let Some(loc) = index.units.remove(&ntiid) {
                        let unit = UnitRef::new(&loc);
                        index.forget_embedding(unit.unit());
                    }
                    removed.push(ntiid);
                }
            }
        }
        if !removed.is_empty() {
            info!(library = %self.name, removed = ?removed, "Removed invalid content units");
        }
        if let Some(parent) = &self.parent {
            removed.extend(parent.remove_invalid_content_units());
        }
        removed
    }

    // --- shared with the sync engine ---

    pub(crate) fn notify(&self, event: LibraryEvent) {
        self.sink.notify(&self.name, &event);
    }

    pub(crate) fn do_add(&self, package: &PackageHandle, results: Option<&mut LibrarySyncResults>) {
        {
            let mut state = self.state.write();
            let index = state.index.get_or_insert_with(LibraryIndex::default);
            index.record_units(package);
            index
                .packages
                .insert(package.ntiid().clone(), package.clone());
        }
        package.set_owner(Some(&self.name));
        self.registry.register_package(package);
        debug!(library = %self.name, package = %package.ntiid(), "[SYNC] Added package");
        self.notify(LibraryEvent::Created(package.clone()));
        self.notify(LibraryEvent::Added(package.clone()));
        if let Some(results) = results {
            results.added(package.ntiid().clone());
        }
    }

    pub(crate) fn do_remove(&self, old: &PackageHandle, results: Option<&mut LibrarySyncResults>) {
        {
            let mut state = self.state.write();
            if let Some(index) = state.index.as_mut() {
                index.unrecord_units(old);
                index.packages.remove(old.ntiid());
            }
        }
        debug!(library = %self.name, package = %old.ntiid(), "[SYNC] Removed package");
        self.notify(LibraryEvent::Removed(old.clone()));
        old.set_owner(None);
        self.registry.unregister_package(old);
        if let Some(results) = results {
            results.removed(old.ntiid().clone());
        }
    }

    pub(crate) fn do_update(
        &self,
        new: &PackageHandle,
        old: &PackageHandle,
        results: Option<&mut LibrarySyncResults>,
    ) -> Result<(), SyncError> {
        if new.ntiid() != old.ntiid() {
            return Err(SyncError::UnmatchedRootNtiid {
                old: old.ntiid().clone(),
                new: new.ntiid().clone(),
            });
        }
        {
            let mut state = self.state.write();
            let index = state.index.get_or_insert_with(LibraryIndex::default);
            index.packages.insert(new.ntiid().clone(), new.clone());
            index.unrecord_units(old);
            index.record_units(new);
        }
        new.set_owner(Some(&self.name));
        self.registry.register_package(new);
        if let Some(results) = results {
            results.modified(new.ntiid().clone());
        }
        debug!(library = %self.name, package = %new.ntiid(), "[SYNC] Replaced package");
        self.notify(LibraryEvent::Replaced {
            new: new.clone(),
            old: old.clone(),
        });
        self.registry.unregister_package(old);
        old.set_owner(None);
        Ok(())
    }
}

impl fmt::Debug for ContentPackageLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentPackageLibrary")
            .field("name", &self.name)
            .field("synced", &self.is_synced())
            .field("packages", &self.len())
            .field("parent", &self.parent.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}
