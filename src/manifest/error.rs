//! Error types for manifest handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Cannot read manifest {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Cannot write manifest {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
}

pub type ManifestResult<T> = Result<T, ManifestError>;
