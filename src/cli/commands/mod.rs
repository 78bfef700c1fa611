//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod config;
pub mod deploy;
pub mod identify;
pub mod watch;

use std::fs;
use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::manifest::ManifestStore;
use crate::pipeline::DeploymentPipeline;
use crate::runtime::ComposeCli;

/// Create the log directory, then start logging to stderr and the history
/// log. Any failure here is a startup failure.
pub fn prepare(settings: &Settings) -> anyhow::Result<()> {
    fs::create_dir_all(&settings.log_dir).with_context(|| {
        format!("failed to create log directory {}", settings.log_dir.display())
    })?;

    let history = settings.history_log();
    crate::logging::init_with_config(&settings.logging, Some(&history))
        .with_context(|| format!("failed to open history log {}", history.display()))?;
    Ok(())
}

/// Pipeline wired to the compose CLI and the configured manifest.
pub fn pipeline(settings: &Settings) -> Arc<DeploymentPipeline> {
    let runtime = Arc::new(ComposeCli::new(&settings.runtime));
    Arc::new(DeploymentPipeline::new(
        runtime,
        ManifestStore::new(&settings.manifest_path),
    ))
}
