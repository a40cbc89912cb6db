//! # enumeration: discovering candidate content packages
//!
//! A library never looks at storage directly; it asks its
//! [`ContentPackageEnumeration`] for the full current set of top-level
//! packages and diffs that against what it has indexed. Enumerated packages
//! are fresh values that no library owns yet.
//!
//! - [`StaticEnumeration`]: a replaceable in-memory list.
//! - [`HierarchyEnumeration`]: every child bucket of a root bucket, turned
//!   into a package by a [`PackageFactory`].
//! - [`JsonTocPackageFactory`]: builds a package from the JSON table of
//!   contents found in a bucket.

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::HierarchyError;
use crate::hierarchy::{HierarchyBucket, HierarchyNode};
use crate::unit::{ContentPackage, ContentUnit};

/// Buckets whose name starts with this were created through the authoring
/// API and are never picked up from disk.
pub const AUTHORED_PREFIX: &str = "_authored";

/// The table-of-contents file that marks a bucket as a content package.
pub const TOC_FILENAME: &str = "content_package.json";

/// Produces the current full set of top-level packages for a library.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentPackageEnumeration: Send + Sync {
    async fn enumerate_content_packages(&self) -> Result<Vec<ContentPackage>, HierarchyError>;

    /// When the enumerated source last changed, if the source tracks it.
    fn last_modified(&self) -> f64;

    fn created_time(&self) -> f64;
}

/// Turns one bucket into a package, or `None` if the bucket holds no package.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PackageFactory: Send + Sync {
    async fn package_for(
        &self,
        bucket: Arc<dyn HierarchyBucket>,
    ) -> Result<Option<ContentPackage>, HierarchyError>;
}

/// A fixed, replaceable list of packages. Each enumeration hands out fresh
/// copies, as a storage-backed enumeration would.
#[derive(Debug, Default)]
pub struct StaticEnumeration {
    packages: Mutex<Vec<ContentPackage>>,
    last_modified: Mutex<f64>,
}

impl StaticEnumeration {
    pub fn new(packages: Vec<ContentPackage>) -> Self {
        Self {
            packages: Mutex::new(packages),
            last_modified: Mutex::new(0.0),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_packages(&self, packages: Vec<ContentPackage>) {
        *self.packages.lock() = packages;
    }

    pub fn set_last_modified(&self, last_modified: f64) {
        *self.last_modified.lock() = last_modified;
    }
}

#[async_trait]
impl ContentPackageEnumeration for StaticEnumeration {
    async fn enumerate_content_packages(&self) -> Result<Vec<ContentPackage>, HierarchyError> {
        Ok(self.packages.lock().clone())
    }

    fn last_modified(&self) -> f64 {
        *self.last_modified.lock()
    }

    fn created_time(&self) -> f64 {
        0.0
    }
}

/// Enumerates the immediate child buckets of `root`.
pub struct HierarchyEnumeration {
    root: Arc<dyn HierarchyBucket>,
    factory: Arc<dyn PackageFactory>,
}

impl HierarchyEnumeration {
    pub fn new(root: Arc<dyn HierarchyBucket>, factory: Arc<dyn PackageFactory>) -> Self {
        Self { root, factory }
    }

    pub fn root(&self) -> &Arc<dyn HierarchyBucket> {
        &self.root
    }

    fn include(bucket: &Arc<dyn HierarchyBucket>) -> bool {
        !bucket.name().starts_with(AUTHORED_PREFIX)
    }
}

#[async_trait]
impl ContentPackageEnumeration for HierarchyEnumeration {
    async fn enumerate_content_packages(&self) -> Result<Vec<ContentPackage>, HierarchyError> {
        let candidates: Vec<Arc<dyn HierarchyBucket>> = self
            .root
            .enumerate_children()
            .await?
            .into_iter()
            .filter_map(|node| match node {
                HierarchyNode::Bucket(bucket) if Self::include(&bucket) => Some(bucket),
                _ => None,
            })
            .collect();

        debug!(root = %self.root.path(), candidates = candidates.len(), "Enumerating possible content packages");

        let packages = try_join_all(
            candidates
                .into_iter()
                .map(|bucket| self.factory.package_for(bucket)),
        )
        .await?;

        let packages: Vec<ContentPackage> = packages.into_iter().flatten().collect();
        info!(root = %self.root.path(), packages = packages.len(), "Enumerated content packages");
        Ok(packages)
    }

    fn last_modified(&self) -> f64 {
        self.root.last_modified()
    }

    fn created_time(&self) -> f64 {
        self.root.created_time()
    }
}

/// Reads [`TOC_FILENAME`] from a bucket as a JSON unit tree. The package's
/// timestamps are those of the TOC key.
#[derive(Debug, Default, Clone)]
pub struct JsonTocPackageFactory;

#[async_trait]
impl PackageFactory for JsonTocPackageFactory {
    async fn package_for(
        &self,
        bucket: Arc<dyn HierarchyBucket>,
    ) -> Result<Option<ContentPackage>, HierarchyError> {
        let key = match bucket.get_child_named(TOC_FILENAME).await? {
            Some(HierarchyNode::Key(key)) => key,
            _ => {
                debug!(bucket = %bucket.path(), "No table of contents, not a content package");
                return Ok(None);
            }
        };

        let value = key.read_contents_as_json().await?;
        let mut unit: ContentUnit =
            serde_json::from_value(value).map_err(|source| HierarchyError::Json {
                path: key.path(),
                source,
            })?;
        unit.assign_ordinals();

        Ok(Some(
            ContentPackage::new(unit, key.last_modified())
                .with_created_time(key.created_time())
                .with_root(bucket.path()),
        ))
    }
}
