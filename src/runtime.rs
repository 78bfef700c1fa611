//! Container runtime collaborator.
//!
//! The pipeline only needs four operations from the runtime, each reporting
//! success or failure. [`ComposeCli`] runs them as `docker` and
//! `docker-compose` child processes whose output goes straight to the
//! agent's stdout and stderr.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::RuntimeConfig;

/// Errors from runtime invocations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: String },
}

/// Operations the deployment pipeline needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Import an image archive.
    async fn load(&self, archive: &Path) -> Result<(), RuntimeError>;

    /// Pull the images referenced by the manifest.
    async fn pull(&self, manifest: &Path) -> Result<(), RuntimeError>;

    /// Recreate the running services from the manifest.
    async fn recreate(&self, manifest: &Path) -> Result<(), RuntimeError>;

    /// Remove images no container uses.
    async fn prune_images(&self) -> Result<(), RuntimeError>;
}

/// A program plus arguments, printable as a shell-like command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs the docker and docker-compose command line tools.
#[derive(Debug, Clone)]
pub struct ComposeCli {
    docker: String,
    compose: String,
}

impl ComposeCli {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            docker: config.docker.clone(),
            compose: config.compose.clone(),
        }
    }

    /// `docker load -i <archive>`
    pub fn load_invocation(&self, archive: &Path) -> Invocation {
        Invocation::new(
            &self.docker,
            [OsString::from("load"), "-i".into(), archive.into()],
        )
    }

    /// `docker-compose -f <manifest> pull`
    pub fn pull_invocation(&self, manifest: &Path) -> Invocation {
        Invocation::new(
            &self.compose,
            [OsString::from("-f"), manifest.into(), "pull".into()],
        )
    }

    /// `docker-compose -f <manifest> up -d --force-recreate`
    pub fn recreate_invocation(&self, manifest: &Path) -> Invocation {
        Invocation::new(
            &self.compose,
            [
                OsString::from("-f"),
                manifest.into(),
                "up".into(),
                "-d".into(),
                "--force-recreate".into(),
            ],
        )
    }

    /// `docker image prune -a -f`
    pub fn prune_invocation(&self) -> Invocation {
        Invocation::new(&self.docker, ["image", "prune", "-a", "-f"])
    }

    async fn run(&self, invocation: Invocation) -> Result<(), RuntimeError> {
        let command = invocation.to_string();
        crate::log_event!("runtime", "running", "{command}");

        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(RuntimeError::Failed {
                command,
                status: status.to_string(),
            });
        }

        crate::log_event!("runtime", "completed", "{command}");
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for ComposeCli {
    async fn load(&self, archive: &Path) -> Result<(), RuntimeError> {
        self.run(self.load_invocation(archive)).await
    }

    async fn pull(&self, manifest: &Path) -> Result<(), RuntimeError> {
        self.run(self.pull_invocation(manifest)).await
    }

    async fn recreate(&self, manifest: &Path) -> Result<(), RuntimeError> {
        self.run(self.recreate_invocation(manifest)).await
    }

    async fn prune_images(&self) -> Result<(), RuntimeError> {
        self.run(self.prune_invocation()).await
    }
}
