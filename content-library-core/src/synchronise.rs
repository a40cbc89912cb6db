//! Package synchronisation: reconciles a library layer with its enumeration.
//!
//! One call to [`ContentPackageLibrary::sync_content_packages`]:
//!   - Enumerates the current full set of top-level packages
//!   - Partitions them against the local layer into added, removed, changed
//!     and unmodified packages, before touching anything
//!   - Refuses to remove anything unless the caller allowed removal
//!   - Applies removals, then replacements, then additions, firing one event
//!     per package as it goes
//!   - Fires the aggregate `LibraryModifiedOnSync` after all three, then
//!     `Unmodified` per untouched package and finally `DidSync`
//!
//! # Change detection
//! A package is changed only when the enumerated `last_modified` is strictly
//! greater than the indexed one. Tree contents are never compared. Packages
//! with `auto_sync == false` are always unmodified.
//!
//! # Failure
//! The removal check and the duplicate check run before any mutation. A
//! failure while applying changes (an NTIID mismatch) leaves whatever was
//! already applied in place.
//!
//! # Callable From
//! - The CLI orchestrator, global library first and then each site
//! - Integration tests, with static or mocked enumerations

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::SyncError;
use crate::events::LibraryEvent;
use crate::library::{ContentPackageLibrary, LibraryIndex};
use crate::ntiid::Ntiid;
use crate::results::{LibrarySyncResults, SyncResults};
use crate::time;
use crate::unit::{ContentPackage, PackageHandle};

/// Caller-controlled knobs for one sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncParams {
    /// When non-empty, no new packages are added; existing packages are
    /// still updated and removed.
    pub ntiids: Vec<Ntiid>,
    pub allow_removal: bool,
}

impl SyncParams {
    pub fn allowing_removal() -> Self {
        Self {
            allow_removal: true,
            ..Self::default()
        }
    }

    pub fn with_ntiids(mut self, ntiids: impl IntoIterator<Item = Ntiid>) -> Self {
        self.ntiids = ntiids.into_iter().collect();
        self
    }
}

/// The work one sync has to do, computed up front.
#[derive(Debug, Default)]
struct SyncPlan {
    added: Vec<ContentPackage>,
    removed: Vec<PackageHandle>,
    /// (new, old)
    changed: Vec<(ContentPackage, PackageHandle)>,
    unmodified: Vec<PackageHandle>,
}

impl SyncPlan {
    fn compute(
        current: Vec<PackageHandle>,
        mut enumerated: BTreeMap<Ntiid, ContentPackage>,
        params: &SyncParams,
    ) -> Self {
        let mut plan = SyncPlan::default();
        for old in current {
            if !old.auto_sync {
                enumerated.remove(old.ntiid());
                plan.unmodified.push(old);
                continue;
            }
            match enumerated.remove(old.ntiid()) {
                None => plan.removed.push(old),
                Some(new) if old.last_modified < new.last_modified => {
                    plan.changed.push((new, old))
                }
                Some(_) => plan.unmodified.push(old),
            }
        }
        // Whatever is left was not in the library.
        if params.ntiids.is_empty() {
            plan.added = enumerated.into_values().collect();
        }
        plan
    }

    fn has_work(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }
}

fn key_by_ntiid(
    packages: Vec<ContentPackage>,
) -> Result<BTreeMap<Ntiid, ContentPackage>, SyncError> {
    let mut keyed = BTreeMap::new();
    for package in packages {
        let ntiid = package.ntiid().clone();
        if keyed.insert(ntiid.clone(), package).is_some() {
            return Err(SyncError::DuplicatePackage { ntiid });
        }
    }
    Ok(keyed)
}

fn ntiids<'a>(packages: impl IntoIterator<Item = &'a PackageHandle>) -> Vec<Ntiid> {
    packages.into_iter().map(|p| p.ntiid().clone()).collect()
}

impl ContentPackageLibrary {
    /// Reconciles this layer with its enumeration. The per-library result is
    /// returned and also appended to `results`.
    pub async fn sync_content_packages(
        &self,
        params: &SyncParams,
        results: &mut SyncResults,
    ) -> Result<LibrarySyncResults, SyncError> {
        info!(library = %self.name(), params = ?params, "[SYNC] Starting content package sync");
        self.notify(LibraryEvent::WillSync);

        let mut lib_results = LibrarySyncResults::new(self.name());
        let never_synced = !self.is_synced();

        let enumerated = self
            .enumeration()
            .enumerate_content_packages()
            .await
            .map_err(|e| {
                error!(library = %self.name(), error = ?e, "[SYNC][ERROR] Enumeration failed");
                SyncError::from(e)
            })?;
        let enumeration_last_modified = self.enumeration().last_modified();
        let enumerated = key_by_ntiid(enumerated).map_err(|e| {
            error!(library = %self.name(), error = %e, "[SYNC][ERROR] Enumeration yielded a duplicate package");
            e
        })?;

        let plan = SyncPlan::compute(self.local_packages(), enumerated, params);
        let has_work = plan.has_work();
        let unmodified = plan.unmodified;

        if has_work || never_synced {
            if !never_synced {
                info!(library = %self.name(), packages = ?plan.added.iter().map(|p| p.ntiid()).collect::<Vec<_>>(), "[SYNC] Adding packages");
                info!(library = %self.name(), packages = ?ntiids(&plan.removed), "[SYNC] Removing packages");
                info!(library = %self.name(), packages = ?ntiids(plan.changed.iter().map(|(_, old)| old)), "[SYNC] Changing packages");
            }

            if !plan.removed.is_empty() && !params.allow_removal {
                let err = SyncError::ContentRemoval {
                    library: self.name().to_string(),
                    removed: ntiids(&plan.removed),
                };
                error!(library = %self.name(), error = %err, "[SYNC][ERROR] Refusing to remove packages");
                return Err(err);
            }

            {
                let mut state = self.state.write();
                state.index.get_or_insert_with(LibraryIndex::default);
                state.enumeration_last_modified = enumeration_last_modified;
            }

            let removed = ntiids(&plan.removed);
            for old in &plan.removed {
                self.do_remove(old, Some(&mut lib_results));
            }

            let mut changed = Vec::with_capacity(plan.changed.len());
            for (new, old) in plan.changed {
                let new = Arc::new(new);
                self.do_update(&new, &old, Some(&mut lib_results))?;
                changed.push(new.ntiid().clone());
            }

            let mut added = Vec::with_capacity(plan.added.len());
            for new in plan.added {
                let new = Arc::new(new);
                self.do_add(&new, Some(&mut lib_results));
                added.push(new.ntiid().clone());
            }

            self.notify(LibraryEvent::LibraryModifiedOnSync {
                added,
                removed,
                changed,
            });
        }

        for package in unmodified {
            self.notify(LibraryEvent::Unmodified(package));
        }
        self.notify(LibraryEvent::DidSync);
        self.state.write().last_synchronized = time::now();

        info!(
            library = %self.name(),
            added = lib_results.added.len(),
            modified = lib_results.modified.len(),
            removed = lib_results.removed.len(),
            "[SYNC] Content package sync finished"
        );
        results.add(lib_results.clone());
        Ok(lib_results)
    }
}
