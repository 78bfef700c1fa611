//! Deploy command - run the pipeline once for a given archive.

use std::path::Path;

use anyhow::{Context, bail};

use crate::artifact;
use crate::config::Settings;
use crate::pipeline::{PipelineRun, Stage};

pub async fn run(settings: &Settings, archive: &Path) -> anyhow::Result<PipelineRun> {
    let identity = artifact::identify_path(archive).with_context(|| {
        format!("{} is not a <name>-<version>.tar archive", archive.display())
    })?;
    if !archive.is_file() {
        bail!("archive {} does not exist", archive.display());
    }

    super::prepare(settings)?;
    let pipeline = super::pipeline(settings);
    let run = pipeline.run(archive, &identity).await;

    for step in run.steps() {
        let mark = if step.success { "ok" } else { "FAILED" };
        println!("{:<9} {:<7} {}", step.step, mark, step.detail);
    }

    if let Stage::Failed { step, cause } = run.stage() {
        bail!("deployment of {identity} failed at {step}: {cause}");
    }
    Ok(run)
}
