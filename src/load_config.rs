//! `load_config` module: Loads a static YAML config and applies environment overrides.
//!
//! This module is the only place where untrusted YAML is parsed and mapped to the
//! strongly-typed [`Config`].
//!
//! # Responsibilities
//! - Parse user-supplied YAML configuration files into type-safe Rust structs
//! - Apply environment overrides (`CONTENT_LIBRARY_ALLOW_REMOVAL`)
//! - Reject configurations whose library names collide, since sync results are keyed by name
//! - Ensure clear error messages for CLI and tests: any failure in loading must say whether
//!   reading, parsing or validation failed.
//!
//! # Errors
//! All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.

use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::Config;

/// Overrides `sync.allow_removal` when set to `true` or `false`.
pub const ALLOW_REMOVAL_ENV: &str = "CONTENT_LIBRARY_ALLOW_REMOVAL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;

    config.trace_loaded();
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    let Ok(value) = std::env::var(ALLOW_REMOVAL_ENV) else {
        return Ok(());
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => config.sync.allow_removal = true,
        "false" | "0" | "no" => config.sync.allow_removal = false,
        other => {
            error!(env = ALLOW_REMOVAL_ENV, value = other, "Invalid environment override");
            return Err(anyhow::anyhow!(
                "Invalid value for {ALLOW_REMOVAL_ENV}: {other:?} (expected true or false)"
            ));
        }
    }
    warn!(
        env = ALLOW_REMOVAL_ENV,
        allow_removal = config.sync.allow_removal,
        "Removal permission overridden from environment"
    );
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    let mut names = HashSet::new();
    names.insert(config.global.name.as_str());
    for site in &config.sites {
        if !names.insert(site.name.as_str()) {
            error!(name = %site.name, "Duplicate library name in config");
            return Err(anyhow::anyhow!(
                "Invalid config: duplicate library name {:?}",
                site.name
            ));
        }
    }
    Ok(())
}
