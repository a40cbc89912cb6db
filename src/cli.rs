//! # content-library CLI Interface (Module)
//!
//! Command parsing and the async entrypoint for the `content-library` binary.
//!
//! All library logic (packages, layered libraries, synchronisers) lives in the
//! [`content_library_core`] crate. This module is strictly CLI glue:
//! argument exposure, config loading and printing the run report.
//!
//! ## How To Use
//! - For command-line users: use the installed `content-library` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! The report is printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::load_config::load_config;
use crate::synchronise::synchronise;

/// CLI for content-library: sync content packages and bundles from disk.
#[derive(Parser)]
#[clap(
    name = "content-library",
    version,
    about = "Synchronise layered content package and bundle libraries with content on disk"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the global library and every site library using the given config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Allow packages that disappeared from disk to be removed
        #[clap(long)]
        allow_removal: bool,
        /// Restrict the run to this package NTIID (repeatable); no packages are added
        #[clap(long = "package")]
        packages: Vec<String>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            allow_removal,
            packages,
        } => {
            let config = load_config(config)?;
            let mut params = config.sync.params();
            params.allow_removal |= allow_removal;
            params
                .ntiids
                .extend(packages.into_iter().map(Into::into));

            tracing::info!(command = "sync", ?params, "Starting synchronisation process");
            match synchronise(&config, &params).await {
                Ok(report) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    let json = serde_json::to_string_pretty(&report)
                        .context("Failed to serialise sync report")?;
                    println!("{json}");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, code = ?e.code(), "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation failed"))
                }
            }
        }
    }
}
