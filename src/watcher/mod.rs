//! Directory-tree watching.
//!
//! # Architecture
//!
//! ```text
//! Supervisor
//!   - Single notify::RecommendedWatcher (non-recursive registrations)
//!   - WatchTree: registers every directory under the root
//!   - classify(): raw notify event -> SemanticEvent
//!         |
//!    +----------------+-----------------+
//!    |                |                 |
//! ArtifactArrived  DirectoryAppeared  PathRemoved/PathRenamed
//!    |                |                 |
//! DeploymentPipeline  WatchTree walk    WatchTree forget
//! ```

mod classify;
mod error;
mod supervisor;
mod tree;

pub use classify::{SemanticEvent, classify};
pub use error::WatchError;
pub use supervisor::{Supervisor, SupervisorBuilder, SupervisorStats};
pub use tree::{WalkSummary, WatchRegistrar, WatchTree};
