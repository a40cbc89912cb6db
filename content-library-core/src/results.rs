//! Value objects describing what a sync run did.

use serde::{Deserialize, Serialize};

use crate::ntiid::Ntiid;

/// What one library layer added, replaced and removed during one sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibrarySyncResults {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Added", default)]
    pub added: Vec<Ntiid>,
    #[serde(rename = "Modified", default)]
    pub modified: Vec<Ntiid>,
    #[serde(rename = "Removed", default)]
    pub removed: Vec<Ntiid>,
}

impl LibrarySyncResults {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn added(&mut self, ntiid: Ntiid) {
        self.added.push(ntiid);
    }

    pub fn modified(&mut self, ntiid: Ntiid) {
        self.modified.push(ntiid);
    }

    pub fn removed(&mut self, ntiid: Ntiid) {
        self.removed.push(ntiid);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Every per-library result of one multi-library run, in sync order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResults {
    #[serde(rename = "Items", default)]
    pub items: Vec<LibrarySyncResults>,
}

impl SyncResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: LibrarySyncResults) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LibrarySyncResults> {
        self.items.iter()
    }

    /// The result recorded for the library called `name`, if it ran.
    pub fn for_library(&self, name: &str) -> Option<&LibrarySyncResults> {
        self.items.iter().find(|item| item.name == name)
    }
}
