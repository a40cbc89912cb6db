//! Coordinating module for a multi-library sync run.
//!
//! # Responsibilities
//! - Open the global library over its content directory, and one library per
//!   site layered on top of it, all sharing one identity registry
//! - Sync packages global first, then every site in config order
//! - Sync each layer's bundles after that layer's packages, so bundle
//!   references resolve against fresh packages
//! - Collect everything into one serialisable [`SyncReport`]
//!
//! The first failing step aborts the run; layers synced before it keep
//! their changes.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use content_library_core::hierarchy::FilesystemBucket;
use content_library_core::{
    sync_from_bucket, BundleLibrary, BundleSyncResults, ContentPackageEnumeration,
    ContentPackageLibrary, EventSink, HierarchyEnumeration, IdentityRegistry,
    JsonTocPackageFactory, StaticEnumeration, SyncError, SyncParams, SyncResults,
    TracingEventSink,
};

use crate::config::Config;

/// Everything one run did, in sync order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    #[serde(rename = "Packages")]
    pub packages: SyncResults,
    #[serde(rename = "Bundles")]
    pub bundles: Vec<BundleSyncResults>,
}

/// One library layer: its packages, its bundles and where its bundles live.
pub struct Layer {
    pub packages: Arc<ContentPackageLibrary>,
    pub bundles: Arc<BundleLibrary>,
    bundles_root: Option<PathBuf>,
}

impl Layer {
    pub fn name(&self) -> &str {
        self.packages.name()
    }

    async fn sync(&self, params: &SyncParams, report: &mut SyncReport) -> Result<(), SyncError> {
        self.packages
            .sync_content_packages(params, &mut report.packages)
            .await
            .map_err(|e| {
                error!(library = %self.name(), error = %e, "[SYNC][ERROR] Package sync failed");
                e
            })?;

        let Some(root) = &self.bundles_root else {
            return Ok(());
        };
        let bucket = FilesystemBucket::open(root).await?;
        let results = sync_from_bucket(&self.bundles, &self.packages, &bucket)
            .await
            .map_err(|e| {
                error!(library = %self.name(), error = %e, "[BUNDLES][ERROR] Bundle sync failed");
                e
            })?;
        report.bundles.push(results);
        Ok(())
    }
}

/// The global layer plus every configured site layer.
pub struct LibrarySet {
    pub global: Layer,
    pub sites: Vec<Layer>,
    registry: Arc<IdentityRegistry>,
}

impl LibrarySet {
    /// Builds every layer from `config`. Content directories must exist.
    pub async fn open(config: &Config, sink: Arc<dyn EventSink>) -> Result<Self, SyncError> {
        let registry = Arc::new(IdentityRegistry::new());

        let global_packages = Arc::new(
            ContentPackageLibrary::new(
                config.global.name.clone(),
                filesystem_enumeration(&config.global.root).await?,
            )
            .with_registry(registry.clone())
            .with_event_sink(sink.clone()),
        );
        let global_bundles =
            Arc::new(BundleLibrary::new(config.global.name.clone()).with_event_sink(sink.clone()));
        let global = Layer {
            packages: global_packages,
            bundles: global_bundles,
            bundles_root: config.global.bundles.clone(),
        };

        let mut sites = Vec::with_capacity(config.sites.len());
        for site in &config.sites {
            let enumeration: Arc<dyn ContentPackageEnumeration> = match &site.root {
                Some(root) => filesystem_enumeration(root).await?,
                None => Arc::new(StaticEnumeration::empty()),
            };
            let packages = ContentPackageLibrary::new(site.name.clone(), enumeration)
                .with_parent(global.packages.clone())
                .with_registry(registry.clone())
                .with_event_sink(sink.clone());
            let bundles = BundleLibrary::new(site.name.clone())
                .with_parent(global.bundles.clone())
                .with_event_sink(sink.clone());
            sites.push(Layer {
                packages: Arc::new(packages),
                bundles: Arc::new(bundles),
                bundles_root: site.bundles.clone(),
            });
        }

        info!(global = %global.name(), sites = sites.len(), "[SYNC] Opened libraries");
        Ok(Self {
            global,
            sites,
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn site(&self, name: &str) -> Option<&Layer> {
        self.sites.iter().find(|site| site.name() == name)
    }

    /// Syncs the global layer, then each site.
    pub async fn synchronise(&self, params: &SyncParams) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        self.global.sync(params, &mut report).await?;
        for site in &self.sites {
            site.sync(params, &mut report).await?;
        }
        info!(
            libraries = report.packages.len(),
            bundle_libraries = report.bundles.len(),
            "[SYNC] Synchronisation finished"
        );
        Ok(report)
    }
}

async fn filesystem_enumeration(
    root: &Path,
) -> Result<Arc<dyn ContentPackageEnumeration>, SyncError> {
    let bucket = FilesystemBucket::open(root).await.map_err(|e| {
        error!(root = %root.display(), error = %e, "[SYNC][ERROR] Cannot open content root");
        e
    })?;
    Ok(Arc::new(HierarchyEnumeration::new(
        Arc::new(bucket),
        Arc::new(JsonTocPackageFactory),
    )))
}

/// Opens every library described by `config` and syncs them once.
pub async fn synchronise(config: &Config, params: &SyncParams) -> Result<SyncReport, SyncError> {
    info!(params = ?params, "[SYNC] Starting synchronisation");
    let libraries = LibrarySet::open(config, Arc::new(TracingEventSink)).await?;
    libraries.synchronise(params).await
}
