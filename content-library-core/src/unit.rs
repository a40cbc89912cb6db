//! Content units and content packages.
//!
//! A [`ContentUnit`] is one node of a package's table of contents; a
//! [`ContentPackage`] is the root unit of one piece of content together with
//! the package-level metadata the synchroniser needs (timestamps, backing
//! location, sync policy). Unit trees are immutable snapshots: a sync cycle
//! replaces a package wholesale rather than editing its tree.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::ntiid::Ntiid;

/// Shared handle to a package held by a library. Identity is `Arc::ptr_eq`.
pub type PackageHandle = Arc<ContentPackage>;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// One node in a content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub ntiid: Ntiid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub href: String,
    /// 1-based position among the parent's children; 0 for a root.
    #[serde(default)]
    pub ordinal: u32,
    #[serde(default)]
    pub children: Vec<ContentUnit>,
    /// NTIIDs referenced by this unit but not owned by it.
    #[serde(default, rename = "embeddedContainerNTIIDs")]
    pub embedded_container_ntiids: Vec<Ntiid>,
}

impl ContentUnit {
    pub fn new(ntiid: impl Into<Ntiid>) -> Self {
        Self {
            ntiid: ntiid.into(),
            title: String::new(),
            href: String::new(),
            ordinal: 0,
            children: Vec::new(),
            embedded_container_ntiids: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }

    /// Appends a child, numbering it after the existing children.
    pub fn with_child(mut self, mut child: ContentUnit) -> Self {
        child.ordinal = self.children.len() as u32 + 1;
        self.children.push(child);
        self
    }

    pub fn with_embedded(mut self, ntiid: impl Into<Ntiid>) -> Self {
        self.embedded_container_ntiids.push(ntiid.into());
        self
    }

    /// Renumbers every descendant by position, recursively.
    pub fn assign_ordinals(&mut self) {
        for (idx, child) in self.children.iter_mut().enumerate() {
            child.ordinal = idx as u32 + 1;
            child.assign_ordinals();
        }
    }

    /// Pre-order walk of this unit and all its descendants, each paired with
    /// the child-index path leading to it from `self`.
    pub fn flatten(&self) -> Vec<(Vec<usize>, &ContentUnit)> {
        fn walk<'a>(
            unit: &'a ContentUnit,
            path: &mut Vec<usize>,
            out: &mut Vec<(Vec<usize>, &'a ContentUnit)>,
        ) {
            out.push((path.clone(), unit));
            for (idx, child) in unit.children.iter().enumerate() {
                path.push(idx);
                walk(child, path, out);
                path.pop();
            }
        }

        let mut out = Vec::new();
        walk(self, &mut Vec::new(), &mut out);
        out
    }

    /// Follows a child-index path from this unit.
    pub fn descendant(&self, path: &[usize]) -> Option<&ContentUnit> {
        path.iter()
            .try_fold(self, |unit, idx| unit.children.get(*idx))
    }

    pub fn find(&self, ntiid: &str) -> Option<&ContentUnit> {
        if self.ntiid == ntiid {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(ntiid))
    }
}

/// The root unit of one piece of content plus package-level metadata.
///
/// Equality for synchronisation purposes is by NTIID only; two packages with
/// the same NTIID and different content are the same package, changed.
pub struct ContentPackage {
    instance: u64,
    unit: ContentUnit,
    /// Authoritative "has the backing representation changed" signal.
    pub last_modified: f64,
    pub created_time: f64,
    /// Location of the bucket backing this package.
    pub root: Option<String>,
    /// `false` marks a package that sync must never touch.
    pub auto_sync: bool,
    /// Created through an authoring API rather than discovered by sync.
    pub editable: bool,
    owner: Mutex<Option<String>>,
}

impl ContentPackage {
    pub fn new(unit: ContentUnit, last_modified: f64) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            unit,
            last_modified,
            created_time: last_modified,
            root: None,
            auto_sync: true,
            editable: false,
            owner: Mutex::new(None),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_created_time(mut self, created_time: f64) -> Self {
        self.created_time = created_time;
        self
    }

    pub fn without_auto_sync(mut self) -> Self {
        self.auto_sync = false;
        self
    }

    pub fn as_editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn ntiid(&self) -> &Ntiid {
        &self.unit.ntiid
    }

    pub fn title(&self) -> &str {
        &self.unit.title
    }

    pub fn unit(&self) -> &ContentUnit {
        &self.unit
    }

    /// Process-unique id of this value; clones get a fresh one.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Name of the library that currently owns this package, if any.
    pub fn owner(&self) -> Option<String> {
        self.owner.lock().clone()
    }

    pub(crate) fn set_owner(&self, owner: Option<&str>) {
        *self.owner.lock() = owner.map(str::to_owned);
    }
}

impl Clone for ContentPackage {
    fn clone(&self) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            unit: self.unit.clone(),
            last_modified: self.last_modified,
            created_time: self.created_time,
            root: self.root.clone(),
            auto_sync: self.auto_sync,
            editable: self.editable,
            owner: Mutex::new(None),
        }
    }
}

impl fmt::Debug for ContentPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentPackage")
            .field("ntiid", &self.unit.ntiid)
            .field("last_modified", &self.last_modified)
            .field("root", &self.root)
            .field("units", &self.unit.flatten().len())
            .finish()
    }
}
