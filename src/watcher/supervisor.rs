//! Top-level event loop.
//!
//! Owns the notify watcher, feeds every event through the classifier, keeps
//! the [`WatchTree`] current and hands artifact arrivals to the deployment
//! pipeline. By default a pipeline run blocks the loop until it finishes;
//! the backend keeps buffering notifications meanwhile.
//!
//! The channel from the notify callback is unbounded. The loop itself adds
//! watches through the backend, and the backend thread services those
//! requests, so its callback must never wait on the loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use notify::Event;
use tokio::sync::mpsc;

use crate::artifact;
use crate::config::Settings;
use crate::pipeline::{DeploymentPipeline, PipelineQueue};

use super::classify::{SemanticEvent, classify};
use super::error::WatchError;
use super::tree::WatchTree;

/// Where artifact arrivals go.
enum Dispatch {
    /// Run on the event loop, one at a time.
    Inline(Arc<DeploymentPipeline>),
    /// Hand to a worker pool.
    Queued(PipelineQueue),
}

/// Counters reported when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Raw notify events received.
    pub events: usize,
    /// Artifact arrivals accepted.
    pub arrivals: usize,
    /// Pipeline runs completed (inline runs plus drained queue runs).
    pub runs: usize,
    /// Inline runs that ended in a failed stage.
    pub failed_runs: usize,
}

/// The agent's main loop.
pub struct Supervisor {
    tree: WatchTree<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    dispatch: Dispatch,
    stats: SupervisorStats,
}

impl Supervisor {
    /// Create a builder for configuring the supervisor.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// The watch tree, for inspection.
    pub fn tree(&self) -> &WatchTree<notify::RecommendedWatcher> {
        &self.tree
    }

    /// Process events until `shutdown` resolves.
    ///
    /// Shutdown is only observed between events, so an inline pipeline run
    /// in progress always completes. Queued runs are drained before return.
    pub async fn run<F>(mut self, shutdown: F) -> Result<SupervisorStats, WatchError>
    where
        F: Future<Output = ()>,
    {
        crate::log_event!("watcher", "started", "{}", self.tree.root().display());
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    crate::log_event!("watcher", "shutdown signal received");
                    break Ok(());
                }

                res = self.event_rx.recv() => match res {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => {
                        let err = WatchError::EventError { details: e.to_string() };
                        tracing::error!("[watcher] {err}");
                    }
                    None => break Err(WatchError::ChannelClosed),
                }
            }
        };

        if let Dispatch::Queued(queue) = self.dispatch {
            crate::log_event!("watcher", "draining pipeline queue");
            self.stats.runs += queue.shutdown().await;
        }

        crate::log_event!(
            "watcher",
            "stopped",
            "{} events, {} arrivals, {} runs ({} failed)",
            self.stats.events,
            self.stats.arrivals,
            self.stats.runs,
            self.stats.failed_runs
        );

        result.map(|()| self.stats)
    }

    async fn handle_event(&mut self, event: Event) {
        self.stats.events += 1;

        for semantic in classify(&event) {
            match semantic {
                SemanticEvent::ArtifactArrived { path, identity } => {
                    crate::log_event!(
                        "watcher",
                        "file detected",
                        "{} | {:?}",
                        path.display(),
                        event.kind
                    );
                    self.stats.arrivals += 1;
                    self.dispatch_artifact(path, identity).await;
                }
                SemanticEvent::PathRemoved { ref path } => {
                    crate::log_event!("watcher", "removed", "{}", path.display());
                    self.tree.absorb(&semantic);
                }
                SemanticEvent::PathRenamed {
                    ref path,
                    ref destination,
                } => {
                    match destination {
                        Some(to) => {
                            crate::log_event!("watcher", "renamed", "{} -> {}", path.display(), to.display())
                        }
                        None => crate::log_event!("watcher", "moved away", "{}", path.display()),
                    }
                    self.tree.absorb(&semantic);
                }
                SemanticEvent::DirectoryAppeared { .. } => {
                    // Archives that landed before the new watch existed
                    for path in self.tree.absorb(&semantic) {
                        let Some(identity) = artifact::identify_path(&path) else {
                            continue;
                        };
                        crate::log_event!("watcher", "file detected", "{} | in new directory", path.display());
                        self.stats.arrivals += 1;
                        self.dispatch_artifact(path, identity).await;
                    }
                }
                SemanticEvent::Ignored { ref path, reason } => {
                    // Misnamed archives are worth an operator's attention
                    if artifact::has_artifact_extension(path) && artifact::identify_path(path).is_none() {
                        crate::log_event!("watcher", "skipped", "{}: {reason}", path.display());
                    } else {
                        crate::debug_event!("watcher", "ignored", "{}: {reason}", path.display());
                    }
                }
            }
        }
    }

    async fn dispatch_artifact(&mut self, path: PathBuf, identity: artifact::ArtifactIdentity) {
        match &self.dispatch {
            Dispatch::Inline(pipeline) => {
                let run = pipeline.run(&path, &identity).await;
                self.stats.runs += 1;
                if !run.succeeded() {
                    self.stats.failed_runs += 1;
                }
            }
            Dispatch::Queued(queue) => {
                queue.submit(path, identity);
            }
        }
    }
}

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    root: Option<PathBuf>,
    pipeline: Option<Arc<DeploymentPipeline>>,
    workers: usize,
    queue_capacity: usize,
}

impl SupervisorBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        let defaults = Settings::default();
        Self {
            root: None,
            pipeline: None,
            workers: defaults.pipeline.workers,
            queue_capacity: defaults.pipeline.queue_capacity,
        }
    }

    /// Take root and scheduling from settings.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.root = Some(settings.watch_dir.clone());
        self.workers = settings.pipeline.workers;
        self.queue_capacity = settings.pipeline.queue_capacity;
        self
    }

    /// Set the watched root directory.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the deployment pipeline.
    pub fn pipeline(mut self, pipeline: Arc<DeploymentPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Number of queued workers; zero runs pipelines inline.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Capacity of the worker queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Build the supervisor and register the whole watched tree.
    ///
    /// Failing to register the root is returned as an error; the agent
    /// cannot do anything useful without it. When workers are configured
    /// this must run inside a tokio runtime.
    pub fn build(self) -> Result<Supervisor, WatchError> {
        let root = self.root.ok_or_else(|| WatchError::InitFailed {
            reason: "Watch root is required".to_string(),
        })?;

        let pipeline = self.pipeline.ok_or_else(|| WatchError::InitFailed {
            reason: "Pipeline is required".to_string(),
        })?;

        // Create channel for events
        let (tx, rx) = mpsc::unbounded_channel();

        // Create the notify watcher; its callback runs on the backend thread
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        let mut tree = WatchTree::new(watcher, root);
        tree.register_root()?;

        let dispatch = if self.workers > 0 {
            crate::log_event!(
                "watcher",
                "queued pipelines",
                "{} workers, capacity {}",
                self.workers,
                self.queue_capacity
            );
            Dispatch::Queued(PipelineQueue::spawn(
                pipeline,
                self.workers,
                self.queue_capacity,
            ))
        } else {
            Dispatch::Inline(pipeline)
        };

        Ok(Supervisor {
            tree,
            event_rx: rx,
            dispatch,
            stats: SupervisorStats::default(),
        })
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
