//! Unified logging for the agent.
//!
//! Every line goes to stderr with a compact timestamp and, once a history
//! log is opened, to the append-only `history.log` with a full timestamp.
//! The history log is the operator's audit trail: each detected archive,
//! manifest change and runtime command leaves a line there.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! "dropship::watcher" = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug dropship watch
//! ```

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// History log time format: YYYY-MM-DD HH:MM:SS
struct HistoryTime;

impl FormatTime for HistoryTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    // RUST_LOG env var takes precedence over config
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    EnvFilter::new(&filter_str)
}

/// Open the history log for appending, creating it when absent.
pub fn open_history_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes
/// effect). The history log is opened before the subscriber is installed so
/// an unwritable log is reported to the caller as a startup failure.
pub fn init_with_config(config: &LoggingConfig, history_log: Option<&Path>) -> io::Result<()> {
    let history = history_log.map(open_history_log).transpose()?;

    INIT.call_once(|| {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(build_filter(config));

        let history_layer = history.map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_timer(HistoryTime)
                .with_level(true)
                .with_filter(build_filter(config))
        });

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(history_layer)
            .init();
    });

    Ok(())
}

/// Initialize stderr-only logging with default configuration.
pub fn init() {
    // Without a history log there is nothing to open, so this cannot fail.
    let _ = init_with_config(&LoggingConfig::default(), None);
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("pipeline", "loaded", "{}", path.display());
/// log_event!("watcher", "started");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("watcher", "registered", "{}", dir.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_history_log_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.log");

        let mut first = open_history_log(&path).unwrap();
        writeln!(first, "first").unwrap();
        drop(first);

        let mut second = open_history_log(&path).unwrap();
        writeln!(second, "second").unwrap();
        drop(second);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_unwritable_history_log_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("history.log");

        assert!(init_with_config(&LoggingConfig::default(), Some(&path)).is_err());
    }
}
