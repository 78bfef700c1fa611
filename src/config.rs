//! Configuration for the deployment agent.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - The plain `WATCH_DIR`, `LOG_DIR` and `DOCKER_COMPOSE_FILE` variables
//! - Prefixed environment variable overrides
//!
//! # Environment Variables
//!
//! Prefixed variables start with `DROPSHIP_` and use double underscores
//! to separate nested levels:
//! - `DROPSHIP_PIPELINE__WORKERS=2` sets `pipeline.workers`
//! - `DROPSHIP_RUNTIME__COMPOSE=podman-compose` sets `runtime.compose`
//! - `DROPSHIP_LOGGING__DEFAULT=debug` sets `logging.default`
//!
//! Settings are resolved once at startup and handed to each component as an
//! immutable value.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dropship.toml";

/// File name of the append-only history log inside `log_dir`.
pub const HISTORY_LOG_FILE: &str = "history.log";

/// Unprefixed variables recognised for compatibility with existing deployments.
const PLAIN_ENV: &[(&str, &str)] = &[
    ("WATCH_DIR", "watch_dir"),
    ("LOG_DIR", "log_dir"),
    ("DOCKER_COMPOSE_FILE", "manifest_path"),
];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Root of the directory tree watched for image archives
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Directory holding the history log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Compose file patched and redeployed on each new archive
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Container runtime commands
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Pipeline scheduling
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Program used for `load` and `image prune`
    #[serde(default = "default_docker")]
    pub docker: String,

    /// Program used for `pull` and `up`
    #[serde(default = "default_compose")]
    pub compose: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of queued pipeline workers. Zero runs every pipeline inline on
    /// the event loop.
    #[serde(default)]
    pub workers: usize,

    /// Capacity of the pipeline queue when `workers > 0`. Arrivals beyond
    /// this are dropped with a warning.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `dropship::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_watch_dir() -> PathBuf {
    PathBuf::from("pgGo/storage")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("pgGo/log")
}
fn default_manifest_path() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}
fn default_docker() -> String {
    "docker".to_string()
}
fn default_compose() -> String {
    "docker-compose".to_string()
}
fn default_queue_capacity() -> usize {
    16
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            log_dir: default_log_dir(),
            manifest_path: default_manifest_path(),
            runtime: RuntimeConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker: default_docker(),
            compose: default_compose(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, using `dropship.toml` in the
    /// working directory when it exists.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration with a specific TOML file as the file layer.
    ///
    /// A missing file is not an error; the layer is simply empty.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Unprefixed variables used by existing deployments
            .merge(Env::raw().filter_map(|key| {
                PLAIN_ENV
                    .iter()
                    .find(|(var, _)| key.as_str().eq_ignore_ascii_case(var))
                    .map(|(_, field)| (*field).into())
            }))
            // Prefixed variables, double underscore becomes a dot
            .merge(Env::prefixed("DROPSHIP_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Path of the append-only history log.
    pub fn history_log(&self) -> PathBuf {
        self.log_dir.join(HISTORY_LOG_FILE)
    }

    /// Render the settings as TOML for display.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.watch_dir, PathBuf::from("pgGo/storage"));
        assert_eq!(settings.log_dir, PathBuf::from("pgGo/log"));
        assert_eq!(settings.manifest_path, PathBuf::from("docker-compose.yml"));
        assert_eq!(settings.runtime.docker, "docker");
        assert_eq!(settings.runtime.compose, "docker-compose");
        assert_eq!(settings.pipeline.workers, 0);
        assert_eq!(
            settings.history_log(),
            PathBuf::from("pgGo/log").join("history.log")
        );
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("dropship.toml");

        let toml_content = r#"
watch_dir = "/srv/drop"
manifest_path = "/srv/app/compose.yml"

[runtime]
compose = "podman-compose"

[pipeline]
workers = 2
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.watch_dir, PathBuf::from("/srv/drop"));
        assert_eq!(settings.manifest_path, PathBuf::from("/srv/app/compose.yml"));
        assert_eq!(settings.runtime.compose, "podman-compose");
        // Untouched values keep their defaults
        assert_eq!(settings.runtime.docker, "docker");
        assert_eq!(settings.log_dir, PathBuf::from("pgGo/log"));
        assert_eq!(settings.pipeline.workers, 2);
        assert_eq!(settings.pipeline.queue_capacity, 16);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.runtime, RuntimeConfig::default());
        assert_eq!(settings.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_toml_output_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("dropship.toml");

        let mut settings = Settings::default();
        settings.watch_dir = PathBuf::from("/data/incoming");
        settings.pipeline.queue_capacity = 4;

        fs::write(&config_path, settings.to_toml().unwrap()).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watch_dir, PathBuf::from("/data/incoming"));
        assert_eq!(loaded.pipeline.queue_capacity, 4);
    }
}
