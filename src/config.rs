// content-library/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use content_library_core::{Ntiid, SyncParams};

fn default_global_name() -> String {
    "global".to_string()
}

/// One sync run: the global library, the site libraries layered on top of
/// it, and the knobs passed to every package sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub sync: SyncSection,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            global = %self.global.name,
            sites_count = self.sites.len(),
            allow_removal = self.sync.allow_removal,
            packages_count = self.sync.packages.len(),
            "Loaded Config"
        );
        self.global.trace_loaded();
        for site in &self.sites {
            site.trace_loaded();
        }
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_global_name")]
    pub name: String,
    /// Directory whose sub-directories are content packages.
    pub root: PathBuf,
    /// Directory whose sub-directories are content bundles.
    #[serde(default)]
    pub bundles: Option<PathBuf>,
}

impl GlobalConfig {
    pub fn trace_loaded(&self) {
        info!(
            name = %self.name,
            root = %self.root.display(),
            bundles = ?self.bundles,
            "Loaded global library"
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    /// A site without its own content only sees the global packages.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub bundles: Option<PathBuf>,
}

impl SiteConfig {
    pub fn trace_loaded(&self) {
        info!(
            name = %self.name,
            root = ?self.root,
            bundles = ?self.bundles,
            "Loaded site library"
        );
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default)]
    pub allow_removal: bool,
    /// Restrict the run to these package NTIIDs (updates and removals only).
    #[serde(default)]
    pub packages: Vec<String>,
}

impl SyncSection {
    pub fn params(&self) -> SyncParams {
        SyncParams {
            ntiids: self.packages.iter().map(|p| Ntiid::from(p.as_str())).collect(),
            allow_removal: self.allow_removal,
        }
    }
}
