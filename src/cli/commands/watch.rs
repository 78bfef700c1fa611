//! Watch command - the long-running agent.

use std::fs;

use anyhow::Context;

use crate::config::Settings;
use crate::watcher::{Supervisor, SupervisorStats};

pub async fn run(settings: &Settings) -> anyhow::Result<SupervisorStats> {
    super::prepare(settings)?;
    fs::create_dir_all(&settings.watch_dir).with_context(|| {
        format!("failed to create watch directory {}", settings.watch_dir.display())
    })?;

    crate::log_event!(
        "agent",
        "starting",
        "watching {} for {}",
        settings.watch_dir.display(),
        settings.manifest_path.display()
    );

    let supervisor = Supervisor::builder()
        .settings(settings)
        .pipeline(super::pipeline(settings))
        .build()
        .context("failed to start watcher")?;

    crate::log_event!(
        "agent",
        "watching",
        "{} directories registered",
        supervisor.tree().registered_count()
    );

    let stats = supervisor.run(shutdown_signal()).await?;
    Ok(stats)
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[agent] failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("[agent] failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
