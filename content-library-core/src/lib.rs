#![doc = "content-library-core: core logic library for content-library."]

//! Content units and packages, layered package and bundle libraries, and the
//! two synchronisers that keep them in step with content on disk.
//! No configuration or CLI concerns live here.
//!
//! # Usage
//! Build a [`ContentPackageLibrary`] over an enumeration, sync it with
//! [`ContentPackageLibrary::sync_content_packages`], then sync bundles into a
//! [`BundleLibrary`] with [`sync_from_bucket`].

pub mod bundle;
pub mod enumeration;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod identity;
pub mod library;
pub mod ntiid;
pub mod results;
pub mod synchronise;
pub mod time;
pub mod unit;
pub mod wref;

pub use bundle::{
    sync_from_bucket, BundleHandle, BundleLibrary, BundleMetaInfo, BundleSyncResults,
    ContentPackageBundle,
};
pub use enumeration::{
    ContentPackageEnumeration, HierarchyEnumeration, JsonTocPackageFactory, PackageFactory,
    StaticEnumeration,
};
pub use error::{HierarchyError, SyncError};
pub use events::{EventSink, LibraryEvent, NullEventSink, RecordingEventSink, TracingEventSink};
pub use identity::IdentityRegistry;
pub use library::{ContentPackageLibrary, UnitRef};
pub use ntiid::Ntiid;
pub use results::{LibrarySyncResults, SyncResults};
pub use synchronise::SyncParams;
pub use unit::{ContentPackage, ContentUnit, PackageHandle};
pub use wref::PackageRef;
