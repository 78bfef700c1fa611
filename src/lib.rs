pub mod artifact;
pub mod cli;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod runtime;
pub mod watcher;

pub use artifact::{ArtifactIdentity, identify};
pub use config::Settings;
pub use manifest::{ManifestDocument, ManifestError, ManifestStore, PatchOutcome};
pub use pipeline::{DeploymentPipeline, PipelineQueue, PipelineRun, Stage, Step};
pub use runtime::{ComposeCli, ContainerRuntime, RuntimeError};
pub use watcher::{Supervisor, SupervisorBuilder, WatchError, WatchTree};
