//! Local-disk hierarchy: directories are buckets, regular files are keys.

use async_trait::async_trait;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

use super::{HierarchyBucket, HierarchyKey, HierarchyNode};
use crate::error::HierarchyError;
use crate::time::epoch_seconds;

fn io_error(path: &Path, source: std::io::Error) -> HierarchyError {
    HierarchyError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// (last_modified, created_time); filesystems without a birth time report mtime.
fn times(metadata: &Metadata) -> (f64, f64) {
    let modified = metadata.modified().map(epoch_seconds).unwrap_or(0.0);
    let created = metadata.created().map(epoch_seconds).unwrap_or(modified);
    (modified, created)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct FilesystemBucket {
    path: PathBuf,
    name: String,
    last_modified: f64,
    created_time: f64,
}

impl FilesystemBucket {
    /// Opens an existing directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HierarchyError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        if !metadata.is_dir() {
            return Err(HierarchyError::NotFound(path.display().to_string()));
        }
        Ok(Self::from_metadata(path, &metadata))
    }

    fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let (last_modified, created_time) = times(metadata);
        Self {
            name: file_name(&path),
            path,
            last_modified,
            created_time,
        }
    }

    pub fn absolute_path(&self) -> &Path {
        &self.path
    }

    fn node_for(path: PathBuf, metadata: &Metadata) -> Option<HierarchyNode> {
        if metadata.is_dir() {
            Some(HierarchyNode::Bucket(Arc::new(Self::from_metadata(
                path, metadata,
            ))))
        } else if metadata.is_file() {
            Some(HierarchyNode::Key(Arc::new(FilesystemKey::from_metadata(
                path, metadata,
            ))))
        } else {
            None
        }
    }
}

#[async_trait]
impl HierarchyBucket for FilesystemBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }

    fn last_modified(&self) -> f64 {
        self.last_modified
    }

    fn created_time(&self) -> f64 {
        self.created_time
    }

    async fn enumerate_children(&self) -> Result<Vec<HierarchyNode>, HierarchyError> {
        let mut entries = tokio::fs::read_dir(&self.path).await.map_err(|e| {
            error!(error = ?e, path = %self.path.display(), "Failed to read bucket directory");
            io_error(&self.path, e)
        })?;

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.path, e))?
        {
            let path = entry.path();
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
            if let Some(node) = Self::node_for(path, &metadata) {
                children.push(node);
            }
        }
        // read_dir order is platform dependent
        children.sort_by(|a, b| a.name().cmp(b.name()));
        debug!(path = %self.path.display(), children = children.len(), "Enumerated bucket");
        Ok(children)
    }

    async fn get_child_named(&self, name: &str) -> Result<Option<HierarchyNode>, HierarchyError> {
        let path = self.path.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(Self::node_for(path, &metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilesystemKey {
    path: PathBuf,
    name: String,
    last_modified: f64,
    created_time: f64,
}

impl FilesystemKey {
    /// Opens an existing regular file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HierarchyError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        if !metadata.is_file() {
            return Err(HierarchyError::NotFound(path.display().to_string()));
        }
        Ok(Self::from_metadata(path, &metadata))
    }

    fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let (last_modified, created_time) = times(metadata);
        Self {
            name: file_name(&path),
            path,
            last_modified,
            created_time,
        }
    }

    pub fn absolute_path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HierarchyKey for FilesystemKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }

    fn bucket_path(&self) -> String {
        self.path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    fn last_modified(&self) -> f64 {
        self.last_modified
    }

    fn created_time(&self) -> f64 {
        self.created_time
    }

    async fn read_contents(&self) -> Result<Vec<u8>, HierarchyError> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            error!(error = ?e, path = %self.path.display(), "Failed to read key");
            io_error(&self.path, e)
        })
    }
}
