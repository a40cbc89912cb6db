//! Non-owning references from bundles to content packages.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::library::ContentPackageLibrary;
use crate::ntiid::Ntiid;
use crate::unit::{ContentPackage, PackageHandle};

/// A reference to a package by NTIID. A bundle never keeps a package alive;
/// packages may disappear from a library and come back later.
///
/// Equality, hashing and ordering look at the NTIID only, so the same
/// package referenced before and after it was resolved compares equal.
#[derive(Clone)]
pub enum PackageRef {
    Resolved {
        ntiid: Ntiid,
        package: Weak<ContentPackage>,
    },
    /// Expected to appear in the library later.
    Pending(Ntiid),
}

impl PackageRef {
    pub fn to_package(package: &PackageHandle) -> Self {
        PackageRef::Resolved {
            ntiid: package.ntiid().clone(),
            package: Arc::downgrade(package),
        }
    }

    pub fn pending(ntiid: impl Into<Ntiid>) -> Self {
        PackageRef::Pending(ntiid.into())
    }

    /// Resolved when `library` currently has the package, pending otherwise.
    pub fn lookup(ntiid: impl Into<Ntiid>, library: Option<&ContentPackageLibrary>) -> Self {
        let ntiid = ntiid.into();
        match library.and_then(|lib| lib.get(ntiid.as_str())) {
            Some(package) => Self::to_package(&package),
            None => PackageRef::Pending(ntiid),
        }
    }

    pub fn ntiid(&self) -> &Ntiid {
        match self {
            PackageRef::Resolved { ntiid, .. } | PackageRef::Pending(ntiid) => ntiid,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PackageRef::Pending(_))
    }

    /// The package this reference was resolved to, if it is still alive.
    pub fn upgrade(&self) -> Option<PackageHandle> {
        match self {
            PackageRef::Resolved { package, .. } => package.upgrade(),
            PackageRef::Pending(_) => None,
        }
    }

    /// Looks the NTIID up in `library` now; never answers from a stale
    /// resolution.
    pub fn resolve(&self, library: &ContentPackageLibrary) -> Option<PackageHandle> {
        library.get(self.ntiid().as_str())
    }
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        self.ntiid() == other.ntiid()
    }
}

impl Eq for PackageRef {}

impl Hash for PackageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ntiid().hash(state);
    }
}

impl PartialOrd for PackageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ntiid().cmp(other.ntiid())
    }
}

impl fmt::Debug for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageRef::Resolved { ntiid, .. } => write!(f, "PackageRef({ntiid})"),
            PackageRef::Pending(ntiid) => write!(f, "PackageRef({ntiid}, pending)"),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.ntiid(), f)
    }
}
