//! Bounded work queue feeding a pool of pipeline workers.
//!
//! The default agent runs every pipeline inline on the event loop. With
//! `pipeline.workers > 0` the supervisor hands arrivals to this queue
//! instead, so the event loop keeps draining notifications while images
//! load. This changes behavior under load: arrivals beyond the queue
//! capacity are dropped here rather than buffered by the OS, and runs for
//! different archives may overlap. Manifest updates stay serialized by the
//! pipeline's store lock.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::DeploymentPipeline;
use crate::artifact::ArtifactIdentity;

struct Job {
    archive: PathBuf,
    identity: ArtifactIdentity,
}

/// Handle to a running worker pool.
pub struct PipelineQueue {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<usize>>,
}

impl PipelineQueue {
    /// Start `workers` tasks consuming a queue of `capacity` pending runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(pipeline: Arc<DeploymentPipeline>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    let mut completed = 0;
                    loop {
                        // Hold the receiver only while waiting for the next job
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        crate::debug_event!("queue", "worker picked up", "{id}: {}", job.identity);
                        pipeline.run(&job.archive, &job.identity).await;
                        completed += 1;
                    }
                    crate::debug_event!("queue", "worker stopped", "{id} after {completed} runs");
                    completed
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Enqueue a run. Returns `false` when the queue is full or closed and
    /// the arrival was dropped.
    pub fn submit(&self, archive: PathBuf, identity: ArtifactIdentity) -> bool {
        let label = identity.to_string();
        match self.tx.try_send(Job { archive, identity }) {
            Ok(()) => {
                crate::debug_event!("queue", "queued", "{label}");
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    "[queue] full, dropping {} ({})",
                    job.archive.display(),
                    label
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("[queue] closed, dropping {label}");
                false
            }
        }
    }

    /// Close the queue and wait for workers to finish every queued run.
    ///
    /// Returns the number of completed runs.
    pub async fn shutdown(self) -> usize {
        drop(self.tx);
        let mut completed = 0;
        for worker in self.workers {
            match worker.await {
                Ok(count) => completed += count,
                Err(e) => tracing::error!("[queue] worker panicked: {e}"),
            }
        }
        completed
    }
}
