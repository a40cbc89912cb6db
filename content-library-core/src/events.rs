//! # events: lifecycle notifications
//!
//! Libraries report every change they make through an injected
//! [`EventSink`]. Events are delivered synchronously, one at a time, and never
//! while the emitting library holds its internal lock: a sink may query the
//! library and will see the state that the event describes.
//!
//! Package sync ordering is fixed:
//! `WillSync`, removals, replacements, `Created`/`Added` pairs,
//! `LibraryModifiedOnSync`, `Unmodified`..., `DidSync`.

use parking_lot::Mutex;
use tracing::{debug, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::bundle::BundleHandle;
use crate::ntiid::Ntiid;
use crate::unit::PackageHandle;

#[derive(Debug, Clone)]
pub enum LibraryEvent {
    WillSync,
    Created(PackageHandle),
    Added(PackageHandle),
    Removed(PackageHandle),
    /// A changed package; `old` is handed out so subscribers can migrate
    /// anything keyed off it.
    Replaced {
        new: PackageHandle,
        old: PackageHandle,
    },
    Unmodified(PackageHandle),
    LibraryModifiedOnSync {
        added: Vec<Ntiid>,
        removed: Vec<Ntiid>,
        changed: Vec<Ntiid>,
    },
    DidSync,
    BundleCreated(BundleHandle),
    BundleAdded(BundleHandle),
    BundleModified {
        bundle: BundleHandle,
        changed_fields: Vec<String>,
    },
    BundleRemoved(BundleHandle),
    BundleLibraryModifiedOnSync {
        added: Vec<Ntiid>,
        updated: Vec<Ntiid>,
    },
    BundleVendorInfoSynchronized(BundleHandle),
}

impl LibraryEvent {
    pub fn label(&self) -> &'static str {
        match self {
            LibraryEvent::WillSync => "WillSync",
            LibraryEvent::Created(_) => "Created",
            LibraryEvent::Added(_) => "Added",
            LibraryEvent::Removed(_) => "Removed",
            LibraryEvent::Replaced { .. } => "Replaced",
            LibraryEvent::Unmodified(_) => "Unmodified",
            LibraryEvent::LibraryModifiedOnSync { .. } => "LibraryModifiedOnSync",
            LibraryEvent::DidSync => "DidSync",
            LibraryEvent::BundleCreated(_) => "BundleCreated",
            LibraryEvent::BundleAdded(_) => "BundleAdded",
            LibraryEvent::BundleModified { .. } => "BundleModified",
            LibraryEvent::BundleRemoved(_) => "BundleRemoved",
            LibraryEvent::BundleLibraryModifiedOnSync { .. } => "BundleLibraryModifiedOnSync",
            LibraryEvent::BundleVendorInfoSynchronized(_) => "BundleVendorInfoSynchronized",
        }
    }

    /// The NTIID of the object the event is about, if it is about one object.
    pub fn subject(&self) -> Option<Ntiid> {
        match self {
            LibraryEvent::Created(p)
            | LibraryEvent::Added(p)
            | LibraryEvent::Removed(p)
            | LibraryEvent::Unmodified(p)
            | LibraryEvent::Replaced { new: p, .. } => Some(p.ntiid().clone()),
            LibraryEvent::BundleCreated(b)
            | LibraryEvent::BundleAdded(b)
            | LibraryEvent::BundleRemoved(b)
            | LibraryEvent::BundleVendorInfoSynchronized(b)
            | LibraryEvent::BundleModified { bundle: b, .. } => Some(b.read().ntiid.clone()),
            LibraryEvent::WillSync
            | LibraryEvent::DidSync
            | LibraryEvent::LibraryModifiedOnSync { .. }
            | LibraryEvent::BundleLibraryModifiedOnSync { .. } => None,
        }
    }
}

/// Receives lifecycle events from libraries. `library` is the emitting
/// library's name.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait EventSink: Send + Sync {
    fn notify(&self, library: &str, event: &LibraryEvent);
}

/// Writes each event to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn notify(&self, library: &str, event: &LibraryEvent) {
        match event {
            LibraryEvent::LibraryModifiedOnSync {
                added,
                removed,
                changed,
            } => {
                info!(library, added = ?added, removed = ?removed, changed = ?changed, "[EVENT] Library modified on sync");
            }
            LibraryEvent::BundleLibraryModifiedOnSync { added, updated } => {
                info!(library, added = ?added, updated = ?updated, "[EVENT] Bundle library modified on sync");
            }
            LibraryEvent::BundleModified {
                bundle,
                changed_fields,
            } => {
                debug!(library, bundle = %bundle.read().ntiid, fields = ?changed_fields, "[EVENT] BundleModified");
            }
            other => match other.subject() {
                Some(ntiid) => debug!(library, %ntiid, "[EVENT] {}", other.label()),
                None => debug!(library, "[EVENT] {}", other.label()),
            },
        }
    }
}

/// Keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, LibraryEvent)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, LibraryEvent)> {
        self.events.lock().clone()
    }

    /// Event labels, optionally suffixed with their subject, e.g. `Added:P1`.
    pub fn labels(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|(_, event)| match event.subject() {
                Some(ntiid) => format!("{}:{}", event.label(), ntiid),
                None => event.label().to_string(),
            })
            .collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| event.label() == label)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn notify(&self, library: &str, event: &LibraryEvent) {
        self.events.lock().push((library.to_string(), event.clone()));
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn notify(&self, _library: &str, _event: &LibraryEvent) {}
}
