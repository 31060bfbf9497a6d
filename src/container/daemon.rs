//! Docker daemon access
//!
//! `DockerDaemon` is the only way the registry reaches the daemon. The
//! production implementation talks to the local Engine API through bollard;
//! tests substitute an in-memory daemon.

use super::spec::ContainerSpec;
use crate::error::{FactoryError, Result};
use async_trait::async_trait;
use bollard::models::{ContainerCreateBody, HostConfig, NetworkCreateRequest, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    ListContainersOptions, ListNetworksOptions, LogsOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use tracing::debug;

/// Raw container output as delivered by the daemon
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Container entry from a daemon listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as the daemon reports them, with a leading `/`
    pub names: Vec<String>,
    pub image: String,
}

impl ContainerSummary {
    /// Whether one of the names equals `name` exactly
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n) == name)
    }

    /// Whether one of the names starts with `prefix`
    pub fn has_name_prefix(&self, prefix: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n).starts_with(prefix))
    }
}

/// Run state of an inspected container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerState {
    pub running: bool,
}

/// Operations the registry needs from a Docker daemon
#[async_trait]
pub trait DockerDaemon: Send + Sync {
    /// Names of networks matching `name`
    async fn list_networks(&self, name: &str) -> Result<Vec<String>>;

    async fn create_network(&self, name: &str) -> Result<()>;

    /// All containers, running or not, optionally filtered by name
    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<ContainerSummary>>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerState>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Remove a container together with its anonymous volumes
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Labels of a local image
    async fn image_labels(&self, image: &str) -> Result<HashMap<String, String>>;

    /// Pull an image, returning once the pull has finished
    async fn pull_image(&self, image: &str) -> Result<()>;

    async fn logs(&self, id: &str, follow: bool, tail: Option<usize>) -> Result<LogStream>;
}

/// Daemon backed by the Docker Engine API
#[derive(Clone)]
pub struct BollardDaemon {
    docker: Docker,
}

impl BollardDaemon {
    /// Connect using the platform's default socket and environment
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

fn daemon_error(err: bollard::errors::Error) -> FactoryError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => FactoryError::Daemon {
            status_code,
            message,
        },
        other => FactoryError::Docker(other),
    }
}

fn name_filter(name: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("name".to_string(), vec![name.to_string()])])
}

#[async_trait]
impl DockerDaemon for BollardDaemon {
    async fn list_networks(&self, name: &str) -> Result<Vec<String>> {
        let options = ListNetworksOptions {
            filters: Some(name_filter(name)),
            ..Default::default()
        };

        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(daemon_error)?;

        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.docker
            .create_network(NetworkCreateRequest {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .map_err(daemon_error)?;
        Ok(())
    }

    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all: true,
            filters: name.map(name_filter),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(daemon_error)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    names: c.names.unwrap_or_default(),
                    image: c.image.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptionsBuilder::default()
            .name(&spec.name)
            .build();

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| (p.key(), HashMap::new()))
            .collect();

        let port_bindings = spec
            .ports
            .iter()
            .map(|p| {
                (
                    p.key(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(p.port.to_string()),
                    }]),
                )
            })
            .collect();

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            tty: Some(spec.tty),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            host_config: Some(HostConfig {
                network_mode: Some(spec.network.clone()),
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(daemon_error)?;

        for warning in &response.warnings {
            debug!("create {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(daemon_error)?;

        let running = inspect.state.and_then(|s| s.running).unwrap_or(false);
        Ok(ContainerState { running })
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(daemon_error)
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(daemon_error)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::default()
            .force(force)
            .v(true)
            .build();

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(daemon_error)
    }

    async fn image_labels(&self, image: &str) -> Result<HashMap<String, String>> {
        let inspect = self
            .docker
            .inspect_image(image)
            .await
            .map_err(daemon_error)?;

        Ok(inspect.config.and_then(|c| c.labels).unwrap_or_default())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let options = CreateImageOptionsBuilder::default()
            .from_image(image)
            .build();

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(info) = progress.next().await {
            let info = info.map_err(daemon_error)?;
            if let Some(status) = info.status {
                debug!("pull {}: {}", image, status);
            }
        }

        Ok(())
    }

    async fn logs(&self, id: &str, follow: bool, tail: Option<usize>) -> Result<LogStream> {
        let tail = tail.map_or_else(|| "all".to_string(), |n| n.to_string());
        let options = LogsOptionsBuilder::default()
            .follow(follow)
            .stdout(true)
            .stderr(true)
            .tail(&tail)
            .build();

        let stream = self
            .docker
            .logs(id, Some(options))
            .map(|chunk| chunk.map(|output| output.into_bytes()).map_err(daemon_error));

        Ok(Box::pin(stream))
    }
}
