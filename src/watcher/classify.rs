//! Classification of raw notify events into semantic events.

use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::artifact::{self, ArtifactIdentity};

/// What a filesystem notification means to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticEvent {
    /// A file named like an image archive was created or written.
    ArtifactArrived {
        path: PathBuf,
        identity: ArtifactIdentity,
    },

    /// A directory was created or moved into the tree.
    DirectoryAppeared { path: PathBuf },

    /// A path was removed.
    PathRemoved { path: PathBuf },

    /// A path was moved away. The destination is only known when the
    /// backend reports both halves of the rename in one event.
    PathRenamed {
        path: PathBuf,
        destination: Option<PathBuf>,
    },

    /// Nothing to do for this path.
    Ignored { path: PathBuf, reason: &'static str },
}

impl SemanticEvent {
    /// Path the event is about.
    pub fn path(&self) -> &Path {
        match self {
            SemanticEvent::ArtifactArrived { path, .. }
            | SemanticEvent::DirectoryAppeared { path }
            | SemanticEvent::PathRemoved { path }
            | SemanticEvent::PathRenamed { path, .. }
            | SemanticEvent::Ignored { path, .. } => path,
        }
    }

    /// Whether the event changes the shape of the watched tree.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SemanticEvent::DirectoryAppeared { .. }
                | SemanticEvent::PathRemoved { .. }
                | SemanticEvent::PathRenamed { .. }
        )
    }
}

/// Map one notify event to semantic events, one per reported path.
///
/// Performs at most one `stat` per path.
pub fn classify(event: &Event) -> Vec<SemanticEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| classify_created(p)).collect(),

        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            event.paths.iter().map(|p| classify_written(p)).collect()
        }

        // Backends that pair a rename also report its destination half on
        // its own, and that half is what resolves the new path.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            vec![SemanticEvent::PathRenamed {
                path: event.paths[0].clone(),
                destination: Some(event.paths[1].clone()),
            }]
        }

        EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.iter().map(|p| classify_renamed(p)).collect()
        }

        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| SemanticEvent::PathRemoved { path: p.clone() })
            .collect(),

        _ => event
            .paths
            .iter()
            .map(|p| SemanticEvent::Ignored {
                path: p.clone(),
                reason: "unhandled event kind",
            })
            .collect(),
    }
}

fn classify_created(path: &Path) -> SemanticEvent {
    if fs::metadata(path).is_ok_and(|meta| meta.is_dir()) {
        return SemanticEvent::DirectoryAppeared {
            path: path.to_path_buf(),
        };
    }
    classify_written(path)
}

fn classify_written(path: &Path) -> SemanticEvent {
    match artifact::identify_path(path) {
        Some(identity) => SemanticEvent::ArtifactArrived {
            path: path.to_path_buf(),
            identity,
        },
        None => not_an_artifact(path),
    }
}

/// Resolve a rename by looking at what is at the path now.
fn classify_renamed(path: &Path) -> SemanticEvent {
    match fs::metadata(path) {
        Err(_) => SemanticEvent::PathRenamed {
            path: path.to_path_buf(),
            destination: None,
        },
        Ok(meta) if meta.is_dir() => SemanticEvent::DirectoryAppeared {
            path: path.to_path_buf(),
        },
        Ok(_) => classify_written(path),
    }
}

fn not_an_artifact(path: &Path) -> SemanticEvent {
    let reason = if artifact::has_artifact_extension(path) {
        "archive name does not match <name>-<version>.tar"
    } else {
        "not an image archive"
    };
    SemanticEvent::Ignored {
        path: path.to_path_buf(),
        reason,
    }
}
