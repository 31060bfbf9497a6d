//! Container registry
//!
//! Reconciles role containers against whatever the daemon already holds and
//! keeps track of the containers this session started, so a failed or
//! interrupted start can be rolled back without touching anything else.

use super::daemon::{ContainerSummary, DockerDaemon, LogStream};
use super::role::{ClusterStatus, ContainerRole, ContainerStatus};
use super::spec::ContainerSpec;
use crate::config::{FactoryConfig, RunOptions};
use crate::error::{FactoryError, Result};
use bytes::{Bytes, BytesMut};
use futures_util::future::join_all;
use futures_util::StreamExt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Label on the Codex image naming the blockchain image it was built against
pub const BLOCKCHAIN_IMAGE_LABEL_KEY: &str = "storage.codex.nim-codex.blockchain-image";

/// A container the registry found or created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Containers started during this session, in start order.
///
/// Entries are only ever added.
#[derive(Debug, Clone, Default)]
pub struct RunningSet {
    containers: Vec<ContainerHandle>,
}

impl RunningSet {
    fn insert(&mut self, container: ContainerHandle) {
        if !self.containers.iter().any(|c| c.id == container.id) {
            self.containers.push(container);
        }
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerHandle> {
        self.containers.iter()
    }

    /// Container names in start order
    pub fn names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.name.clone()).collect()
    }
}

/// Output of a logs request
pub enum ContainerLogs {
    /// Everything the daemon had buffered
    Buffered(Bytes),
    /// Live output until the container stops or the caller drops the stream
    Follow(LogStream),
}

/// Role-aware access to the Docker daemon
pub struct ContainerRegistry {
    daemon: Arc<dyn DockerDaemon>,
    config: FactoryConfig,
    running: RwLock<RunningSet>,
}

impl ContainerRegistry {
    /// Create a registry over an explicit daemon connection
    pub fn new(daemon: Arc<dyn DockerDaemon>, config: FactoryConfig) -> Self {
        Self {
            daemon,
            config,
            running: RwLock::new(RunningSet::default()),
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Snapshot of the containers started this session
    pub fn running_set(&self) -> Result<RunningSet> {
        let running = self
            .running
            .read()
            .map_err(|_| FactoryError::Lock("Failed to acquire read lock".to_string()))?;
        Ok(running.clone())
    }

    fn track(&self, container: ContainerHandle) -> Result<()> {
        let mut running = self
            .running
            .write()
            .map_err(|_| FactoryError::Lock("Failed to acquire write lock".to_string()))?;
        running.insert(container);
        Ok(())
    }

    /// Create the cluster network unless it already exists
    pub async fn create_network(&self) -> Result<()> {
        let name = self.config.network_name();
        let networks = self.daemon.list_networks(&name).await?;

        if networks.iter().any(|n| *n == name) {
            debug!("Network {} already exists", name);
            return Ok(());
        }

        info!("Creating network {}", name);
        self.daemon.create_network(&name).await
    }

    /// Look up a container by its exact name
    pub async fn find_container(&self, name: &str) -> Result<Option<ContainerHandle>> {
        let matches: Vec<ContainerSummary> = self
            .daemon
            .list_containers(Some(name))
            .await?
            .into_iter()
            .filter(|c| c.has_name(name))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => {
                let found = &matches[0];
                Ok(Some(ContainerHandle {
                    id: found.id.clone(),
                    name: name.to_string(),
                    image: found.image.clone(),
                }))
            }
            count => Err(FactoryError::AmbiguousName {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Reuse the container named by `spec` or create it.
    ///
    /// An existing container built from another image is a conflict and is
    /// left untouched.
    pub async fn find_or_create(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        if let Some(existing) = self.find_container(&spec.name).await? {
            if existing.image != spec.image {
                return Err(FactoryError::ImageConflict {
                    name: spec.name.clone(),
                    existing: existing.image,
                    requested: spec.image.clone(),
                });
            }

            info!("Container \"{}\" found, using it", spec.name);
            return Ok(existing);
        }

        info!("Container \"{}\" not found, creating new one", spec.name);

        let id = match self.daemon.create_container(spec).await {
            Ok(id) => id,
            Err(e) if e.is_not_found() => {
                info!("Image {} not found, pulling it", spec.image);
                self.daemon.pull_image(&spec.image).await?;
                self.daemon.create_container(spec).await?
            }
            Err(e) => return Err(e),
        };

        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
            image: spec.image.clone(),
        })
    }

    /// Start the container unless it already runs
    pub async fn ensure_running(&self, container: &ContainerHandle) -> Result<()> {
        let state = self.daemon.inspect_container(&container.id).await?;

        if state.running {
            info!(
                "Container \"{}\" was already running, not starting it again",
                container.name
            );
            return Ok(());
        }

        self.daemon.start_container(&container.id).await
    }

    /// Force-remove a container and its volumes if it exists
    pub async fn remove_if_exists(&self, name: &str) -> Result<()> {
        let Some(container) = self.find_container(name).await? else {
            return Ok(());
        };

        info!("Removing container \"{}\"", name);
        match self.daemon.remove_container(&container.id, true).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Bring one role's container up: optional fresh removal, reconcile, start.
    ///
    /// The container joins the running set once it is running.
    pub async fn launch(&self, spec: &ContainerSpec, options: RunOptions) -> Result<ContainerHandle> {
        if options.fresh {
            self.remove_if_exists(&spec.name).await?;
        }

        self.pull_if_missing(&spec.image).await?;
        let container = self.find_or_create(spec).await?;
        self.ensure_running(&container).await?;
        self.track(container.clone())?;

        Ok(container)
    }

    /// Status of a role's container
    pub async fn status_of(&self, role: ContainerRole) -> Result<ContainerStatus> {
        let name = role.container_name(&self.config.env_prefix);
        let Some(container) = self.find_container(&name).await? else {
            return Ok(ContainerStatus::NotFound);
        };

        match self.daemon.inspect_container(&container.id).await {
            Ok(state) if state.running => Ok(ContainerStatus::Running),
            Ok(_) => Ok(ContainerStatus::Exists),
            Err(e) if e.is_not_found() => Ok(ContainerStatus::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Status of every role, each queried on its own
    pub async fn cluster_status(&self) -> Result<ClusterStatus> {
        let mut status = ClusterStatus::not_found();
        for role in ContainerRole::ALL {
            status.set(role, self.status_of(role).await?);
        }
        Ok(status)
    }

    /// Pull an image unless it is present locally
    pub async fn pull_if_missing(&self, image: &str) -> Result<()> {
        match self.daemon.image_labels(image).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!("Image {} not found locally, pulling it", image);
                self.daemon.pull_image(image).await
            }
            Err(e) => Err(e),
        }
    }

    /// Blockchain image the given Codex image was built against
    pub async fn blockchain_image_for(&self, client_image: &str) -> Result<String> {
        self.pull_if_missing(client_image).await?;

        let labels = self.daemon.image_labels(client_image).await?;
        labels
            .get(BLOCKCHAIN_IMAGE_LABEL_KEY)
            .filter(|image| !image.is_empty())
            .cloned()
            .ok_or_else(|| FactoryError::MissingBlockchainLabel(client_image.to_string()))
    }

    /// Stop the session's containers and, optionally, every prefixed container.
    ///
    /// Containers are processed concurrently. A container that is already
    /// stopped counts as stopped.
    pub async fn stop_all(&self, include_all_with_prefix: bool, remove: bool) -> Result<()> {
        info!("Stopping all containers");

        let tracked: Vec<String> = self.running_set()?.iter().map(|c| c.id.clone()).collect();
        let mut first_error = self.stop_each(tracked, remove).await;

        if include_all_with_prefix {
            let prefixed: Vec<String> = self
                .daemon
                .list_containers(None)
                .await?
                .into_iter()
                .filter(|c| c.has_name_prefix(&self.config.env_prefix))
                .map(|c| c.id)
                .collect();

            let result = self.stop_each(prefixed, remove).await;
            if first_error.is_ok() {
                first_error = result;
            }
        }

        first_error
    }

    async fn stop_each(&self, ids: Vec<String>, remove: bool) -> Result<()> {
        let results = join_all(ids.iter().map(|id| self.stop_one(id, remove))).await;

        let mut first_error = Ok(());
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to stop container {}: {}", id, e);
                if first_error.is_ok() {
                    first_error = Err(e);
                }
            }
        }
        first_error
    }

    async fn stop_one(&self, id: &str, remove: bool) -> Result<()> {
        match self.daemon.stop_container(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_modified() => debug!("Container {} already stopped", id),
            Err(e) => return Err(e),
        }

        if remove {
            match self.daemon.remove_container(id, false).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }

        Ok(())
    }

    /// Output of a role's container
    pub async fn logs(
        &self,
        role: ContainerRole,
        follow: bool,
        tail: Option<usize>,
    ) -> Result<ContainerLogs> {
        let name = role.container_name(&self.config.env_prefix);
        let container = self
            .find_container(&name)
            .await?
            .ok_or(FactoryError::ContainerNotFound(name))?;

        let mut stream = self.daemon.logs(&container.id, follow, tail).await?;
        if follow {
            return Ok(ContainerLogs::Follow(stream));
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(ContainerLogs::Buffered(buffer.freeze()))
    }
}
