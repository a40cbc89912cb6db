//! Bundle descriptors: the transient parse of one `bundle_meta_info.json`.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::SyncError;
use crate::hierarchy::HierarchyKey;
use crate::library::ContentPackageLibrary;
use crate::ntiid::Ntiid;
use crate::time;
use crate::wref::PackageRef;

/// The file that marks a directory as a content bundle.
pub const BUNDLE_META_NAME: &str = "bundle_meta_info.json";

const INLINE_SOURCE: &str = "<inline>";

/// Every top-level field of a descriptor, kept verbatim, plus the resolved
/// package references and the descriptor's own timestamps. Lives for one
/// sync pass.
#[derive(Debug, Clone)]
pub struct BundleMetaInfo {
    pub ntiid: Option<Ntiid>,
    pub fields: Map<String, Value>,
    /// `None` when the descriptor has no `ContentPackages` field.
    pub content_packages: Option<BTreeSet<PackageRef>>,
    /// Path of the descriptor key, `None` for inline JSON.
    pub key_path: Option<String>,
    /// Path of the bucket holding the descriptor.
    pub bucket_path: Option<String>,
    pub created_time: f64,
    pub last_modified: f64,
}

impl BundleMetaInfo {
    /// Reads and parses a descriptor key. Timestamps come from the key.
    pub async fn read(
        key: Arc<dyn HierarchyKey>,
        content_library: Option<&ContentPackageLibrary>,
        require_ntiid: bool,
    ) -> Result<Self, SyncError> {
        let bytes = key.read_contents().await?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| SyncError::InvalidDescriptor {
                key: key.path(),
                reason: e.to_string(),
            })?;
        let mut meta = Self::parse(value, &key.path(), content_library, require_ntiid)?;
        meta.key_path = Some(key.path());
        meta.bucket_path = Some(key.bucket_path());
        meta.created_time = key.created_time();
        meta.last_modified = key.last_modified();
        debug!(key = %key.path(), ntiid = ?meta.ntiid, "[BUNDLES] Read bundle descriptor");
        Ok(meta)
    }

    /// Parses an already-loaded descriptor. Timestamps are the current time.
    pub fn from_json(
        value: Value,
        content_library: Option<&ContentPackageLibrary>,
        require_ntiid: bool,
    ) -> Result<Self, SyncError> {
        Self::parse(value, INLINE_SOURCE, content_library, require_ntiid)
    }

    fn parse(
        value: Value,
        source: &str,
        content_library: Option<&ContentPackageLibrary>,
        require_ntiid: bool,
    ) -> Result<Self, SyncError> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(SyncError::InvalidDescriptor {
                    key: source.to_string(),
                    reason: format!("expected a JSON object, found {}", json_kind(&other)),
                })
            }
        };

        let ntiid = match fields.get("ntiid") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Ntiid::from(s.as_str())),
            Some(_) => {
                return Err(SyncError::InvalidBundleField {
                    field: "ntiid".to_string(),
                    expected: "string",
                })
            }
        };
        if require_ntiid && ntiid.is_none() {
            return Err(SyncError::MissingBundleNtiid {
                key: source.to_string(),
            });
        }

        let content_packages = match fields.get("ContentPackages") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                string_list("ContentPackages", value)?
                    .into_iter()
                    .map(|ntiid| PackageRef::lookup(ntiid, content_library))
                    .collect(),
            ),
        };

        let now = time::now();
        Ok(Self {
            ntiid,
            fields,
            content_packages,
            key_path: None,
            bucket_path: None,
            created_time: now,
            last_modified: now,
        })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn string_list(field: &str, value: &Value) -> Result<Vec<String>, SyncError> {
    let invalid = || SyncError::InvalidBundleField {
        field: field.to_string(),
        expected: "array of strings",
    };
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_ntiid_is_rejected_when_required() {
        let err = BundleMetaInfo::from_json(json!({"title": "t"}), None, true).unwrap_err();
        assert_eq!(err.code(), Some(10));

        let meta = BundleMetaInfo::from_json(json!({"title": "t"}), None, false).unwrap();
        assert!(meta.ntiid.is_none());
        assert_eq!(meta.get("title"), Some(&json!("t")));
    }

    #[test]
    fn unknown_packages_become_pending_references() {
        let meta =
            BundleMetaInfo::from_json(json!({"ntiid": "B1", "ContentPackages": ["P9"]}), None, true)
                .unwrap();
        let refs: Vec<&PackageRef> = meta.content_packages.as_ref().unwrap().iter().collect();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].is_pending());
    }

    #[test]
    fn non_object_descriptor_is_invalid() {
        let err = BundleMetaInfo::from_json(json!(["B1"]), None, true).unwrap_err();
        assert!(matches!(err, SyncError::InvalidDescriptor { .. }));
    }
}
