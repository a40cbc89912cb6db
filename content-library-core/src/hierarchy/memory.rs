//! In-memory hierarchy, built up front and read like any other backend.

use async_trait::async_trait;
use std::sync::Arc;

use super::{HierarchyBucket, HierarchyKey, HierarchyNode};
use crate::error::HierarchyError;

#[derive(Debug, Clone)]
enum MemoryChild {
    Bucket(MemoryBucket),
    Key {
        name: String,
        contents: Vec<u8>,
        last_modified: f64,
        created_time: f64,
    },
}

/// A bucket whose children are held in memory. Paths are `/`-delimited and
/// assigned as children are enumerated.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    path: String,
    last_modified: f64,
    created_time: f64,
    children: Vec<MemoryChild>,
}

impl MemoryBucket {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: format!("/{name}"),
            name,
            last_modified: 0.0,
            created_time: 0.0,
            children: Vec::new(),
        }
    }

    pub fn with_times(mut self, last_modified: f64, created_time: f64) -> Self {
        self.last_modified = last_modified;
        self.created_time = created_time;
        self
    }

    pub fn with_bucket(mut self, bucket: MemoryBucket) -> Self {
        self.children.push(MemoryChild::Bucket(bucket));
        self
    }

    /// Adds a key whose created time equals its modification time.
    pub fn with_key(
        self,
        name: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        last_modified: f64,
    ) -> Self {
        self.with_key_times(name, contents, last_modified, last_modified)
    }

    pub fn with_key_times(
        mut self,
        name: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        last_modified: f64,
        created_time: f64,
    ) -> Self {
        self.children.push(MemoryChild::Key {
            name: name.into(),
            contents: contents.into(),
            last_modified,
            created_time,
        });
        self
    }

    fn child_path(&self, name: &str) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), name)
    }

    fn node(&self, child: &MemoryChild) -> HierarchyNode {
        match child {
            MemoryChild::Bucket(bucket) => {
                let mut bucket = bucket.clone();
                bucket.path = self.child_path(&bucket.name);
                HierarchyNode::Bucket(Arc::new(bucket))
            }
            MemoryChild::Key {
                name,
                contents,
                last_modified,
                created_time,
            } => HierarchyNode::Key(Arc::new(MemoryKey {
                name: name.clone(),
                bucket_path: self.path.clone(),
                contents: contents.clone(),
                last_modified: *last_modified,
                created_time: *created_time,
            })),
        }
    }
}

#[async_trait]
impl HierarchyBucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn last_modified(&self) -> f64 {
        self.last_modified
    }

    fn created_time(&self) -> f64 {
        self.created_time
    }

    async fn enumerate_children(&self) -> Result<Vec<HierarchyNode>, HierarchyError> {
        Ok(self.children.iter().map(|c| self.node(c)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryKey {
    name: String,
    bucket_path: String,
    contents: Vec<u8>,
    last_modified: f64,
    created_time: f64,
}

impl MemoryKey {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>, last_modified: f64) -> Self {
        Self {
            name: name.into(),
            bucket_path: String::new(),
            contents: contents.into(),
            last_modified,
            created_time: last_modified,
        }
    }
}

#[async_trait]
impl HierarchyKey for MemoryKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        format!("{}/{}", self.bucket_path, self.name)
    }

    fn bucket_path(&self) -> String {
        self.bucket_path.clone()
    }

    fn last_modified(&self) -> f64 {
        self.last_modified
    }

    fn created_time(&self) -> f64 {
        self.created_time
    }

    async fn read_contents(&self) -> Result<Vec<u8>, HierarchyError> {
        Ok(self.contents.clone())
    }
}
