//! Error types for the watcher system.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Watch path {path} does not exist")]
    PathVanished { path: PathBuf },

    #[error("Watch path {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

impl WatchError {
    /// Whether the error only means the path is already gone.
    ///
    /// Registration races with directory removal; such failures are benign.
    pub fn is_vanished(&self) -> bool {
        matches!(self, WatchError::PathVanished { .. })
    }
}
