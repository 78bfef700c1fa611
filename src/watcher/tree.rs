//! Recursive watch registration over a mutable directory tree.
//!
//! The OS watch backend is used in non-recursive mode: every directory in
//! the tree gets its own registration. New directories are picked up from
//! structural events; removed directories are retired by the backend itself.
//!
//! Registration races with the filesystem. A directory listed a moment ago
//! may be gone by the time it is registered, and a directory may be created
//! between a listing and the registration of its parent. The walk therefore
//! registers a directory before listing it, and treats vanished paths as
//! benign skips rather than failures.
//!
//! A file written into a new directory before its watch exists produces no
//! event at all. Walks therefore also report the archives they list, and
//! [`WatchTree::absorb`] hands those found in new directories back to the
//! caller.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};

use super::classify::SemanticEvent;
use crate::artifact;
use super::error::WatchError;

/// The narrow interface to the OS-level watch mechanism.
pub trait WatchRegistrar {
    /// Register a single directory (non-recursively).
    fn register(&mut self, dir: &Path) -> Result<(), WatchError>;
}

impl WatchRegistrar for notify::RecommendedWatcher {
    fn register(&mut self, dir: &Path) -> Result<(), WatchError> {
        self.watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| match &e.kind {
                notify::ErrorKind::PathNotFound => WatchError::PathVanished {
                    path: dir.to_path_buf(),
                },
                notify::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound => {
                    WatchError::PathVanished {
                        path: dir.to_path_buf(),
                    }
                }
                _ => WatchError::PathWatchFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                },
            })
    }
}

/// Counts from one recursive walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkSummary {
    /// Directories registered with the backend.
    pub registered: usize,
    /// Directories that disappeared before they could be registered or listed.
    pub vanished: usize,
    /// Directories whose registration or listing failed for another reason.
    pub failed: usize,
    /// Archive files present in the walked directories, in walk order.
    pub archives: Vec<PathBuf>,
}

/// Tracks which directories under the root are registered for notifications.
#[derive(Debug)]
pub struct WatchTree<R> {
    registrar: R,
    root: PathBuf,
    registered: HashSet<PathBuf>,
}

impl<R: WatchRegistrar> WatchTree<R> {
    /// Create a tree for `root`. Nothing is registered until
    /// [`register_root`](Self::register_root) is called.
    pub fn new(registrar: R, root: impl Into<PathBuf>) -> Self {
        Self {
            registrar,
            root: root.into(),
            registered: HashSet::new(),
        }
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register the whole tree under the configured root.
    ///
    /// Failure to register the root itself is returned to the caller; at
    /// startup this is fatal.
    pub fn register_root(&mut self) -> Result<WalkSummary, WatchError> {
        let root = self.root.clone();
        let summary = self.register_recursive(&root)?;
        crate::log_event!(
            "watcher",
            "monitoring",
            "{} directories under {}",
            self.registered.len(),
            root.display()
        );
        Ok(summary)
    }

    /// Register `top` and every directory below it.
    ///
    /// Uses an explicit worklist, so depth is bounded by the heap rather
    /// than the stack. Only a failure on `top` itself is returned; failures
    /// deeper in the tree are logged and counted in the summary.
    pub fn register_recursive(&mut self, top: &Path) -> Result<WalkSummary, WatchError> {
        let mut summary = WalkSummary::default();
        let mut pending = vec![top.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let is_top = dir == top;

            match self.register_dir(&dir) {
                Ok(()) => summary.registered += 1,
                Err(e) if is_top => return Err(e),
                Err(e) if e.is_vanished() => {
                    crate::log_event!("watcher", "skipped vanished directory", "{}", dir.display());
                    summary.vanished += 1;
                    continue;
                }
                Err(e) => {
                    // Keep walking: children may still be watchable.
                    tracing::warn!("[watcher] {e}");
                    summary.failed += 1;
                }
            }

            match list_dir(&dir) {
                Ok(listing) => {
                    summary.archives.extend(listing.archives);
                    // Reverse so the stack visits children in name order.
                    pending.extend(listing.dirs.into_iter().rev());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    crate::log_event!("watcher", "directory vanished while listing", "{}", dir.display());
                    summary.vanished += 1;
                }
                Err(e) => {
                    tracing::warn!("[watcher] cannot list {}: {e}", dir.display());
                    summary.failed += 1;
                }
            }
        }

        crate::debug_event!(
            "watcher",
            "walk complete",
            "{}: {} registered, {} vanished, {} failed",
            top.display(),
            summary.registered,
            summary.vanished,
            summary.failed
        );

        Ok(summary)
    }

    /// Bring registrations up to date with a structural event.
    ///
    /// New directories are walked so their nested contents become visible.
    /// Removals need no deregistration (the backend drops watches on deleted
    /// paths) and only update bookkeeping. Events about paths that are
    /// already gone are no-ops.
    ///
    /// Returns the archives found while walking a new directory.
    pub fn absorb(&mut self, event: &SemanticEvent) -> Vec<PathBuf> {
        match event {
            SemanticEvent::DirectoryAppeared { path } => match self.register_recursive(path) {
                Ok(summary) => {
                    crate::log_event!(
                        "watcher",
                        "directory added",
                        "{} ({} registered)",
                        path.display(),
                        summary.registered
                    );
                    summary.archives
                }
                Err(e) if e.is_vanished() => {
                    crate::debug_event!("watcher", "directory gone before registration", "{}", path.display());
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!("[watcher] failed to extend watch to {}: {e}", path.display());
                    Vec::new()
                }
            },
            SemanticEvent::PathRemoved { path } | SemanticEvent::PathRenamed { path, .. } => {
                self.forget(path);
                Vec::new()
            }
            SemanticEvent::ArtifactArrived { .. } | SemanticEvent::Ignored { .. } => Vec::new(),
        }
    }

    /// Whether `dir` is currently registered.
    pub fn is_registered(&self, dir: &Path) -> bool {
        self.registered.contains(dir)
    }

    /// Number of registered directories.
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// All registered directories, sorted.
    pub fn registered(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.registered.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Access the registrar, e.g. to inspect a test double.
    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    fn register_dir(&mut self, dir: &Path) -> Result<(), WatchError> {
        // One stat up front distinguishes a vanished path from a real failure.
        match fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(WatchError::NotADirectory {
                    path: dir.to_path_buf(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(WatchError::PathVanished {
                    path: dir.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(WatchError::PathWatchFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }

        self.registrar.register(dir)?;
        self.registered.insert(dir.to_path_buf());
        crate::debug_event!("watcher", "watching", "{}", dir.display());
        Ok(())
    }

    /// Drop `path` and everything below it from the bookkeeping.
    fn forget(&mut self, path: &Path) {
        let before = self.registered.len();
        self.registered.retain(|dir| !dir.starts_with(path));
        let retired = before - self.registered.len();
        if retired > 0 {
            crate::debug_event!("watcher", "retired", "{retired} under {}", path.display());
        }
    }
}

/// Entries of one directory that matter to the walk.
#[derive(Default)]
struct Listing {
    dirs: Vec<PathBuf>,
    archives: Vec<PathBuf>,
}

/// Immediate subdirectories and archive files of `dir`, each sorted by
/// name. Symlinks are not followed.
fn list_dir(dir: &Path) -> std::io::Result<Listing> {
    let mut listing = Listing::default();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                crate::debug_event!("watcher", "unreadable entry", "{}: {e}", dir.display());
                continue;
            }
        };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            listing.dirs.push(path);
        } else if file_type.is_file() && artifact::identify_path(&path).is_some() {
            listing.archives.push(path);
        }
    }
    listing.dirs.sort();
    listing.archives.sort();
    Ok(listing)
}
