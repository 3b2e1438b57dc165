//! Container runtime gateway.
//!
//! [`ContainerRuntime`] is the single capability surface the rest of the
//! crate uses to drive containers. Two backends implement it: [`DockerApi`]
//! talks to the Docker Engine REST API, [`DockerCli`] shells out to the
//! `docker` binary. Which one is used is decided once, by [`connect`].

use crate::config::{Backend, RuntimeSettings};
use crate::error::{Operation, RuntimeError};
use crate::types::ContainerRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod api;
pub mod cli;
pub mod models;
pub mod stats;

pub use api::DockerApi;
pub use cli::DockerCli;
pub use stats::{ContainerStats, CpuSample};

/// Grace period given to a container on stop/restart before the runtime
/// kills it.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
    pub protocol: String,
}

impl PortBinding {
    pub fn tcp(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: "tcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn bind(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn to_bind(&self) -> String {
        let mut bind = format!("{}:{}", self.host.display(), self.container);
        if self.read_only {
            bind.push_str(":ro");
        }
        bind
    }
}

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub entrypoint: Option<Vec<String>>,
    pub ports: Vec<PortBinding>,
    pub volumes: Vec<VolumeMount>,
    pub env: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    pub network: Option<String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Succeeds when the network already exists.
    async fn create_network(&self, name: &str) -> RuntimeResult<()>;

    async fn remove_network(&self, name: &str) -> RuntimeResult<()>;

    async fn connect_to_network(&self, id: &str, network: &str) -> RuntimeResult<()>;

    /// Returns the new container id.
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    async fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Stops within [`STOP_GRACE`], then the runtime kills the process.
    async fn stop_container(&self, id: &str) -> RuntimeResult<()>;

    async fn restart_container(&self, id: &str) -> RuntimeResult<()>;

    /// Forced removal; a running container is killed first.
    async fn remove_container(&self, id: &str) -> RuntimeResult<()>;

    /// Create, start and wait for a one-shot container, then remove it.
    /// A non-zero exit code is returned, not raised.
    async fn run_to_completion(&self, spec: &ContainerSpec) -> RuntimeResult<i64>;

    /// `false` for unknown containers and failed inspections.
    async fn is_running(&self, id: &str) -> bool;

    async fn stats(&self, id: &str) -> RuntimeResult<ContainerStats>;

    /// The last `tail` lines, stdout and stderr interleaved in write order.
    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<Vec<String>>;

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerRecord>;

    /// All containers, stopped ones included, whose name starts with `prefix`.
    async fn list_containers(&self, prefix: &str) -> RuntimeResult<Vec<ContainerRecord>>;

    async fn version(&self) -> RuntimeResult<String>;
}

/// Build the configured backend.
pub fn connect(settings: &RuntimeSettings) -> std::result::Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    let runtime: Arc<dyn ContainerRuntime> = match settings.backend {
        Backend::Api => {
            info!(host = %settings.docker_host, "Using Docker Engine API backend");
            Arc::new(DockerApi::new(&settings.docker_host, settings.command_timeout)?)
        }
        Backend::Cli => {
            info!(binary = %settings.docker_binary, "Using docker CLI backend");
            Arc::new(DockerCli::new(&settings.docker_binary, settings.command_timeout))
        }
    };
    Ok(runtime)
}

/// Log output split into clean lines, blank ones dropped.
pub(crate) fn clean_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_error(operation: Operation, reason: impl Into<String>) -> RuntimeError {
    RuntimeError::new(operation, crate::error::RuntimeCause::Parse(reason.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_bind_syntax() {
        let mount = VolumeMount::bind("/srv/alice/data", "/data");
        assert_eq!(mount.to_bind(), "/srv/alice/data:/data");
        assert_eq!(mount.read_only().to_bind(), "/srv/alice/data:/data:ro");
    }

    #[test]
    fn test_clean_lines_drops_blanks() {
        let lines = clean_lines("INFO started\n\n  \nWARN slow peer  \n");
        assert_eq!(lines, vec!["INFO started", "WARN slow peer"]);
    }
}
