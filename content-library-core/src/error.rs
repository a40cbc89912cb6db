//! Error types for content library synchronisation.

use thiserror::Error;

use crate::ntiid::Ntiid;

pub const CONTENT_REMOVAL_ERROR_CODE: u32 = 1;
pub const MISSING_NTIID_ERROR_CODE: u32 = 10;
pub const DUPLICATE_PACKAGES_ERROR_CODE: u32 = 100;
pub const UNMATCHED_ROOT_NTIID_ERROR_CODE: u32 = 105;
pub const MISSING_PACKAGE_REFERENCE_ERROR_CODE: u32 = 110;

/// Failures reading from a content hierarchy (filesystem, in-memory tree).
#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors raised by the package and bundle synchronisers.
///
/// Coded variants carry a stable error code (see [`SyncError::code`]) that
/// the orchestration layer translates into operator-facing messages.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Removal was computed while removals were disallowed. Nothing was mutated.
    #[error("Cannot remove content packages without explicitly allowing it (library {library}, would remove {removed:?}). Code:1")]
    ContentRemoval { library: String, removed: Vec<Ntiid> },

    /// A bundle descriptor had no `ntiid`.
    #[error("Missing ntiid in bundle descriptor {key}. Code:10")]
    MissingBundleNtiid { key: String },

    /// An enumeration produced the same NTIID twice.
    #[error("Duplicate content package {ntiid}. Code:100")]
    DuplicatePackage { ntiid: Ntiid },

    /// A package replacement changed the package's identity.
    #[error("Package NTIID changed from {old} to {new}. Code:105")]
    UnmatchedRootNtiid { old: Ntiid, new: Ntiid },

    /// A bundle references a package that cannot be resolved.
    #[error("Missing content package reference {ntiid}. Code:110")]
    MissingPackageReference { ntiid: Ntiid },

    #[error("Content package not found: {0}")]
    PackageNotFound(Ntiid),

    #[error("Bundle already exists: {0}")]
    DuplicateBundle(Ntiid),

    #[error("Bundle not found: {0}")]
    BundleNotFound(Ntiid),

    #[error("Invalid bundle descriptor {key}: {reason}")]
    InvalidDescriptor { key: String, reason: String },

    #[error("Invalid value for bundle field {field}: expected {expected}")]
    InvalidBundleField {
        field: String,
        expected: &'static str,
    },

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),
}

impl SyncError {
    /// Stable error code, for the variants that have one.
    pub fn code(&self) -> Option<u32> {
        match self {
            SyncError::ContentRemoval { .. } => Some(CONTENT_REMOVAL_ERROR_CODE),
            SyncError::MissingBundleNtiid { .. } => Some(MISSING_NTIID_ERROR_CODE),
            SyncError::DuplicatePackage { .. } => Some(DUPLICATE_PACKAGES_ERROR_CODE),
            SyncError::UnmatchedRootNtiid { .. } => Some(UNMATCHED_ROOT_NTIID_ERROR_CODE),
            SyncError::MissingPackageReference { .. } => {
                Some(MISSING_PACKAGE_REFERENCE_ERROR_CODE)
            }
            SyncError::PackageNotFound(_)
            | SyncError::DuplicateBundle(_)
            | SyncError::BundleNotFound(_)
            | SyncError::InvalidDescriptor { .. }
            | SyncError::InvalidBundleField { .. }
            | SyncError::Hierarchy(_) => None,
        }
    }
}
