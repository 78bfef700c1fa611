//! Redeploy pipeline for one detected archive.
//!
//! ```text
//! Detected -> Loading -> Patching -> Redeploying -> Done
//!                |          |
//!                +----------+--> Failed(step, cause)
//! ```
//!
//! A failed image load stops the run before the manifest is touched. A
//! manifest failure stops the run before any redeploy command. The three
//! redeploy commands are best-effort: each one is attempted even if the
//! previous one failed.

mod queue;

pub use queue::PipelineQueue;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::artifact::ArtifactIdentity;
use crate::manifest::ManifestStore;
use crate::runtime::ContainerRuntime;

/// Side-effecting steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Load,
    Patch,
    Pull,
    Recreate,
    Prune,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Load => "load",
            Step::Patch => "patch",
            Step::Pull => "pull",
            Step::Recreate => "recreate",
            Step::Prune => "prune",
        };
        f.write_str(name)
    }
}

/// Position of a run in its state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Detected,
    Loading,
    Patching,
    Redeploying,
    Done,
    Failed { step: Step, cause: String },
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub success: bool,
    pub detail: String,
}

/// One execution of the pipeline for one archive.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    archive: PathBuf,
    identity: ArtifactIdentity,
    stage: Stage,
    steps: Vec<StepOutcome>,
}

impl PipelineRun {
    fn new(archive: &Path, identity: &ArtifactIdentity) -> Self {
        Self {
            archive: archive.to_path_buf(),
            identity: identity.clone(),
            stage: Stage::Detected,
            steps: Vec::new(),
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn identity(&self) -> &ArtifactIdentity {
        &self.identity
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Step outcomes in execution order.
    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    /// Whether the run reached `Done`. Best-effort redeploy failures do not
    /// prevent this.
    pub fn succeeded(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Number of steps that reported failure.
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.success).count()
    }

    fn enter(&mut self, stage: Stage) {
        crate::debug_event!("pipeline", "stage", "{}: {stage:?}", self.identity);
        self.stage = stage;
    }

    fn record(&mut self, step: Step, success: bool, detail: impl Into<String>) {
        self.steps.push(StepOutcome {
            step,
            success,
            detail: detail.into(),
        });
    }

    fn fail(&mut self, step: Step, cause: String) {
        tracing::error!("[pipeline] {step} failed for {}: {cause}", self.identity);
        self.record(step, false, cause.clone());
        self.enter(Stage::Failed { step, cause });
    }
}

/// Runs the redeploy sequence against a runtime and a manifest.
///
/// The manifest store sits behind an async mutex so concurrent runs (see
/// [`PipelineQueue`]) serialize their load-patch-store cycles. With the
/// default inline scheduling the lock is never contended.
pub struct DeploymentPipeline {
    runtime: Arc<dyn ContainerRuntime>,
    manifest: Mutex<ManifestStore>,
    manifest_path: PathBuf,
}

impl DeploymentPipeline {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, manifest: ManifestStore) -> Self {
        let manifest_path = manifest.path().to_path_buf();
        Self {
            runtime,
            manifest: Mutex::new(manifest),
            manifest_path,
        }
    }

    /// Path of the manifest this pipeline patches.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Run the full sequence for one archive and return the finished run.
    pub async fn run(&self, archive: &Path, identity: &ArtifactIdentity) -> PipelineRun {
        let mut run = PipelineRun::new(archive, identity);
        crate::log_event!("pipeline", "processing", "{} as {identity}", archive.display());

        run.enter(Stage::Loading);
        if let Err(e) = self.runtime.load(archive).await {
            run.fail(Step::Load, e.to_string());
            return run;
        }
        run.record(Step::Load, true, "image loaded");

        run.enter(Stage::Patching);
        let patched = {
            let store = self.manifest.lock().await;
            store.apply(identity.name(), identity.version())
        };
        match patched {
            Ok(outcome) if outcome.matched.is_empty() => {
                crate::log_event!(
                    "pipeline",
                    "no service uses this image",
                    "{} in {}",
                    identity.name(),
                    self.manifest_path.display()
                );
                run.record(Step::Patch, true, "no matching service");
                run.enter(Stage::Done);
                return run;
            }
            Ok(outcome) => {
                run.record(
                    Step::Patch,
                    true,
                    format!(
                        "{} of {} matching services updated",
                        outcome.updates.len(),
                        outcome.matched.len()
                    ),
                );
            }
            Err(e) => {
                run.fail(Step::Patch, e.to_string());
                return run;
            }
        }

        run.enter(Stage::Redeploying);
        let manifest = self.manifest_path.as_path();
        let pulled = self.runtime.pull(manifest).await;
        self.record_best_effort(&mut run, Step::Pull, pulled);
        let recreated = self.runtime.recreate(manifest).await;
        self.record_best_effort(&mut run, Step::Recreate, recreated);
        let pruned = self.runtime.prune_images().await;
        self.record_best_effort(&mut run, Step::Prune, pruned);

        run.enter(Stage::Done);
        crate::log_event!(
            "pipeline",
            "finished",
            "{identity} ({} steps, {} failed)",
            run.steps.len(),
            run.failed_steps()
        );
        run
    }

    fn record_best_effort<E: fmt::Display>(
        &self,
        run: &mut PipelineRun,
        step: Step,
        result: Result<(), E>,
    ) {
        match result {
            Ok(()) => run.record(step, true, "ok"),
            Err(e) => {
                tracing::warn!("[pipeline] {step} failed, continuing: {e}");
                run.record(step, false, e.to_string());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifact::identify;
    use crate::runtime::RuntimeError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Runtime double recording each call; chosen operations fail.
    #[derive(Default)]
    pub(crate) struct RecordingRuntime {
        pub calls: StdMutex<Vec<String>>,
        pub failing: HashSet<&'static str>,
    }

    impl RecordingRuntime {
        pub fn failing(ops: &[&'static str]) -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                failing: ops.iter().copied().collect(),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn call(&self, op: &'static str) -> Result<(), RuntimeError> {
            self.calls.lock().unwrap().push(op.to_string());
            if self.failing.contains(op) {
                return Err(RuntimeError::Failed {
                    command: op.to_string(),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerRuntime for RecordingRuntime {
        async fn load(&self, _archive: &Path) -> Result<(), RuntimeError> {
            self.call("load")
        }
        async fn pull(&self, _manifest: &Path) -> Result<(), RuntimeError> {
            self.call("pull")
        }
        async fn recreate(&self, _manifest: &Path) -> Result<(), RuntimeError> {
            self.call("recreate")
        }
        async fn prune_images(&self) -> Result<(), RuntimeError> {
            self.call("prune")
        }
    }

    const COMPOSE: &str = "services:\n  cache-main:\n    image: cache:2.0\n    hostname: cache\n";

    fn setup(runtime: RecordingRuntime, content: &str) -> (TempDir, Arc<RecordingRuntime>, DeploymentPipeline) {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("docker-compose.yml");
        fs::write(&manifest, content).unwrap();
        let runtime = Arc::new(runtime);
        let pipeline = DeploymentPipeline::new(runtime.clone(), ManifestStore::new(manifest));
        (temp_dir, runtime, pipeline)
    }

    #[tokio::test]
    async fn test_successful_run_walks_every_stage() {
        let (temp_dir, runtime, pipeline) = setup(RecordingRuntime::default(), COMPOSE);
        let identity = identify("cache-2.1.tar").unwrap();

        let run = pipeline.run(&temp_dir.path().join("cache-2.1.tar"), &identity).await;

        assert!(run.succeeded());
        assert_eq!(run.failed_steps(), 0);
        assert_eq!(runtime.calls(), vec!["load", "pull", "recreate", "prune"]);
        let steps: Vec<Step> = run.steps().iter().map(|s| s.step).collect();
        assert_eq!(
            steps,
            vec![Step::Load, Step::Patch, Step::Pull, Step::Recreate, Step::Prune]
        );

        let document = ManifestStore::new(pipeline.manifest_path()).load().unwrap();
        assert_eq!(
            document.service("cache-main").unwrap().image.as_deref(),
            Some("cache:2.1")
        );
    }

    #[tokio::test]
    async fn test_failed_load_leaves_manifest_untouched() {
        let (temp_dir, runtime, pipeline) = setup(RecordingRuntime::failing(&["load"]), COMPOSE);
        let identity = identify("cache-2.1.tar").unwrap();

        let run = pipeline.run(&temp_dir.path().join("cache-2.1.tar"), &identity).await;

        assert!(matches!(run.stage(), Stage::Failed { step: Step::Load, .. }));
        assert_eq!(runtime.calls(), vec!["load"]);
        assert_eq!(fs::read_to_string(pipeline.manifest_path()).unwrap(), COMPOSE);
    }

    #[tokio::test]
    async fn test_redeploy_failures_are_best_effort() {
        let (temp_dir, runtime, pipeline) =
            setup(RecordingRuntime::failing(&["pull", "recreate"]), COMPOSE);
        let identity = identify("cache-2.1.tar").unwrap();

        let run = pipeline.run(&temp_dir.path().join("cache-2.1.tar"), &identity).await;

        assert!(run.succeeded());
        assert_eq!(run.failed_steps(), 2);
        assert_eq!(runtime.calls(), vec!["load", "pull", "recreate", "prune"]);
    }

    #[tokio::test]
    async fn test_unmatched_artifact_ends_run_without_redeploy() {
        let (temp_dir, runtime, pipeline) = setup(RecordingRuntime::default(), COMPOSE);
        let identity = identify("metrics-0.9.tar").unwrap();

        let run = pipeline.run(&temp_dir.path().join("metrics-0.9.tar"), &identity).await;

        assert!(run.succeeded());
        assert_eq!(runtime.calls(), vec!["load"]);
        assert_eq!(fs::read_to_string(pipeline.manifest_path()).unwrap(), COMPOSE);
    }

    #[tokio::test]
    async fn test_malformed_manifest_fails_patch_step() {
        let (temp_dir, runtime, pipeline) =
            setup(RecordingRuntime::default(), "services: [broken\n");
        let identity = identify("cache-2.1.tar").unwrap();

        let run = pipeline.run(&temp_dir.path().join("cache-2.1.tar"), &identity).await;

        assert!(matches!(run.stage(), Stage::Failed { step: Step::Patch, .. }));
        assert_eq!(runtime.calls(), vec!["load"]);
        assert_eq!(
            fs::read_to_string(pipeline.manifest_path()).unwrap(),
            "services: [broken\n"
        );
    }

    #[tokio::test]
    async fn test_duplicate_trigger_is_idempotent() {
        let (temp_dir, runtime, pipeline) = setup(RecordingRuntime::default(), COMPOSE);
        let identity = identify("cache-2.1.tar").unwrap();
        let archive = temp_dir.path().join("cache-2.1.tar");

        let first = pipeline.run(&archive, &identity).await;
        let after_first = fs::read(pipeline.manifest_path()).unwrap();
        let second = pipeline.run(&archive, &identity).await;

        assert!(first.succeeded() && second.succeeded());
        assert_eq!(fs::read(pipeline.manifest_path()).unwrap(), after_first);
        assert_eq!(second.steps()[1].detail, "0 of 1 matching services updated");
        // Both runs redeploy
        assert_eq!(runtime.calls().len(), 8);
    }
}
