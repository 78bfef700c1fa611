//! Load, patch and durably rewrite the manifest file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::document::ManifestDocument;
use super::error::{ManifestError, ManifestResult};
use super::patch::{self, PatchOutcome};

/// Owns the manifest path and every read or write of it.
///
/// Writes go to `<manifest>.tmp` first and are renamed over the live file
/// only after the whole document has been written and synced, so the live
/// manifest is never seen half-written.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The live manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file used while writing.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read and parse the manifest.
    pub fn load(&self) -> ManifestResult<ManifestDocument> {
        let text = fs::read_to_string(&self.path).map_err(|source| ManifestError::Unreadable {
            path: self.path.clone(),
            source,
        })?;

        ManifestDocument::parse(&text).map_err(|reason| ManifestError::Malformed {
            path: self.path.clone(),
            reason,
        })
    }

    /// Patch a document in memory. See [`patch::patch_image_reference`].
    pub fn patch_image_reference(
        document: &mut ManifestDocument,
        logical_name: &str,
        version: &str,
    ) -> PatchOutcome {
        patch::patch_image_reference(document, logical_name, version)
    }

    /// Serialize and atomically replace the manifest.
    pub fn store(&self, document: &ManifestDocument) -> ManifestResult<()> {
        let yaml = document.to_yaml().map_err(|e| self.write_failed(e))?;
        self.write_atomic(yaml.as_bytes(), |file, bytes| file.write_all(bytes))
    }

    /// Full patch cycle: load, patch, and store only when something changed.
    pub fn apply(&self, logical_name: &str, version: &str) -> ManifestResult<PatchOutcome> {
        let mut document = self.load()?;
        let outcome = Self::patch_image_reference(&mut document, logical_name, version);

        if outcome.matched.is_empty() {
            crate::log_event!("manifest", "no service matches", "{logical_name}");
            return Ok(outcome);
        }
        if !outcome.changed() {
            crate::log_event!("manifest", "no service needs updating", "{}", self.path.display());
            return Ok(outcome);
        }

        self.store(&document)?;

        for update in &outcome.updates {
            crate::log_event!(
                "manifest",
                "updated service",
                "'{}': image '{}' -> '{}'",
                update.service,
                update.from.as_deref().unwrap_or(""),
                update.to
            );
        }

        Ok(outcome)
    }

    fn write_atomic<F>(&self, bytes: &[u8], write: F) -> ManifestResult<()>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let temp_path = self.temp_path();

        let written = File::create(&temp_path).and_then(|mut file| {
            write(&mut file, bytes)?;
            file.sync_all()
        });

        let result = written.and_then(|()| fs::rename(&temp_path, &self.path));
        if let Err(e) = result {
            // Never leave a stale temp file behind; the live file is untouched.
            if temp_path.is_file() {
                let _ = fs::remove_file(&temp_path);
            }
            return Err(self.write_failed(e));
        }

        crate::debug_event!("manifest", "written", "{} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn write_failed(&self, e: impl std::fmt::Display) -> ManifestError {
        ManifestError::WriteFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMPOSE: &str = "services:\n  cache-main:\n    image: cache:2.0\n    restart: always\n";

    fn store_in(dir: &TempDir, content: &str) -> ManifestStore {
        let path = dir.path().join("docker-compose.yml");
        fs::write(&path, content).unwrap();
        ManifestStore::new(path)
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let store = ManifestStore::new("/srv/app/docker-compose.yml");
        assert_eq!(store.temp_path(), PathBuf::from("/srv/app/docker-compose.yml.tmp"));
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().unwrap();

        let missing = ManifestStore::new(temp_dir.path().join("absent.yml"));
        assert!(matches!(missing.load(), Err(ManifestError::Unreadable { .. })));

        let malformed = store_in(&temp_dir, "services: [a, b\n");
        assert!(matches!(malformed.load(), Err(ManifestError::Malformed { .. })));
    }

    #[test]
    fn test_apply_writes_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, COMPOSE);

        let outcome = store.apply("cache", "2.1").unwrap();
        assert!(outcome.changed());
        assert!(!store.temp_path().exists());

        let reloaded = store.load().unwrap();
        let entry = reloaded.service("cache-main").unwrap();
        assert_eq!(entry.image.as_deref(), Some("cache:2.1"));
        assert_eq!(entry.restart.as_deref(), Some("always"));
    }

    #[test]
    fn test_apply_without_change_does_not_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        // Comments and spacing would be lost by a rewrite
        let original = "# managed by ops\nservices:\n  cache-main:\n    image:   cache:2.1\n";
        let store = store_in(&temp_dir, original);

        let outcome = store.apply("cache", "2.1").unwrap();
        assert!(!outcome.changed());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), original);

        store.apply("unrelated", "1.0").unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), original);
    }

    #[test]
    fn test_interrupted_write_leaves_manifest_intact() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, COMPOSE);
        let before = fs::read(store.path()).unwrap();

        let result = store.write_atomic(b"services:\n  cache-main:\n    image: cache:9.9\n", |file, bytes| {
            file.write_all(&bytes[..bytes.len() / 2])?;
            Err(io::Error::other("disk full"))
        });

        assert!(matches!(result, Err(ManifestError::WriteFailed { .. })));
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_unwritable_temp_path_fails_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, COMPOSE);
        let before = fs::read(store.path()).unwrap();
        // A directory squatting on the temp name makes the create fail
        fs::create_dir(store.temp_path()).unwrap();

        let mut document = store.load().unwrap();
        ManifestStore::patch_image_reference(&mut document, "cache", "3.0");

        assert!(matches!(
            store.store(&document),
            Err(ManifestError::WriteFailed { .. })
        ));
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(matches!(
            store.apply("cache", "3.0"),
            Err(ManifestError::WriteFailed { .. })
        ));
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }
}
