//! # hierarchy: delimited content hierarchies
//!
//! Content lives in a tree of *buckets* (directory-like containers) and
//! *keys* (readable leaves). The synchronisers only ever need to enumerate
//! buckets, read keys and look at timestamps, so every backend exposes the
//! same two traits:
//!
//! - [`HierarchyBucket`]: `enumerate_children`, `get_child_named`
//! - [`HierarchyKey`]: `read_contents`, `read_contents_as_json`
//!
//! Backends are picked at construction time:
//! - [`filesystem`]: a directory tree on local disk (tokio I/O)
//! - [`memory`]: an in-memory tree, for persisted/static content and tests
//!
//! Timestamps are captured when a node is produced and are stable for the
//! lifetime of that node value.

pub mod filesystem;
pub mod memory;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::HierarchyError;

pub use filesystem::{FilesystemBucket, FilesystemKey};
pub use memory::{MemoryBucket, MemoryKey};

/// A readable leaf of a hierarchy.
#[async_trait]
pub trait HierarchyKey: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Full delimited path of this key.
    fn path(&self) -> String;

    /// Full delimited path of the bucket containing this key.
    fn bucket_path(&self) -> String;

    fn last_modified(&self) -> f64;

    fn created_time(&self) -> f64;

    async fn read_contents(&self) -> Result<Vec<u8>, HierarchyError>;

    async fn read_contents_as_text(&self) -> Result<String, HierarchyError> {
        let bytes = self.read_contents().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parses the contents as JSON. Every call returns a fresh value.
    async fn read_contents_as_json(&self) -> Result<serde_json::Value, HierarchyError> {
        let bytes = self.read_contents().await?;
        serde_json::from_slice(&bytes).map_err(|source| HierarchyError::Json {
            path: self.path(),
            source,
        })
    }
}

/// A directory-like container of keys and further buckets.
#[async_trait]
pub trait HierarchyBucket: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn path(&self) -> String;

    fn last_modified(&self) -> f64;

    fn created_time(&self) -> f64;

    async fn enumerate_children(&self) -> Result<Vec<HierarchyNode>, HierarchyError>;

    async fn get_child_named(&self, name: &str) -> Result<Option<HierarchyNode>, HierarchyError> {
        Ok(self
            .enumerate_children()
            .await?
            .into_iter()
            .find(|child| child.name() == name))
    }
}

/// One child produced by [`HierarchyBucket::enumerate_children`].
#[derive(Debug, Clone)]
pub enum HierarchyNode {
    Bucket(Arc<dyn HierarchyBucket>),
    Key(Arc<dyn HierarchyKey>),
}

impl HierarchyNode {
    pub fn name(&self) -> &str {
        match self {
            HierarchyNode::Bucket(b) => b.name(),
            HierarchyNode::Key(k) => k.name(),
        }
    }

    pub fn path(&self) -> String {
        match self {
            HierarchyNode::Bucket(b) => b.path(),
            HierarchyNode::Key(k) => k.path(),
        }
    }

    pub fn last_modified(&self) -> f64 {
        match self {
            HierarchyNode::Bucket(b) => b.last_modified(),
            HierarchyNode::Key(k) => k.last_modified(),
        }
    }

    pub fn as_bucket(&self) -> Option<&Arc<dyn HierarchyBucket>> {
        match self {
            HierarchyNode::Bucket(b) => Some(b),
            HierarchyNode::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<&Arc<dyn HierarchyKey>> {
        match self {
            HierarchyNode::Key(k) => Some(k),
            HierarchyNode::Bucket(_) => None,
        }
    }
}
