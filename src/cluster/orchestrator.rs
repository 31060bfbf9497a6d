//! Cluster lifecycle
//!
//! Brings the cluster up phase by phase: network, blockchain, client, hosts.
//! Every phase starts its containers and waits until they serve before the
//! next phase begins. A failing phase or an interrupt stops whatever this
//! session started and surfaces the original error.

use crate::config::{FactoryConfig, RunOptions, MAX_HOSTS};
use crate::container::{ContainerLogs, ContainerRegistry, ContainerRole, ContainerSpec};
use crate::error::{FactoryError, Result};
use crate::readiness::{wait_for_blockchain, wait_for_client, wait_for_hosts, NodeApi};
use futures_util::StreamExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// A start-up phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Network,
    Blockchain,
    Client,
    Hosts,
}

impl Phase {
    fn success_message(&self) -> &'static str {
        match self {
            Phase::Network => "Network is up",
            Phase::Blockchain => "Blockchain node is up and listening",
            Phase::Client => "Client boot node is up and listening",
            Phase::Hosts => "Host nodes are up and listening",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Network => write!(f, "network"),
            Phase::Blockchain => write!(f, "blockchain node"),
            Phase::Client => write!(f, "client node"),
            Phase::Hosts => write!(f, "host nodes"),
        }
    }
}

/// Parameters of one start invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Validated Codex version
    pub codex_version: String,
    /// Number of host nodes, `0..=MAX_HOSTS`
    pub hosts: u8,
    /// Return once the cluster is up instead of streaming client logs
    pub detach: bool,
    pub options: RunOptions,
}

impl StartRequest {
    pub fn new(codex_version: &str) -> Self {
        Self {
            codex_version: codex_version.to_string(),
            hosts: MAX_HOSTS,
            detach: false,
            options: RunOptions::default(),
        }
    }

    /// Set host count
    pub fn hosts(mut self, hosts: u8) -> Self {
        self.hosts = hosts;
        self
    }

    /// Set detach mode
    pub fn detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    /// Set fresh start
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.options.fresh = fresh;
        self
    }
}

/// Drives the registry and the readiness probes through a cluster start
pub struct Orchestrator {
    registry: Arc<ContainerRegistry>,
    api: Arc<dyn NodeApi>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ContainerRegistry>, api: Arc<dyn NodeApi>) -> Self {
        Self { registry, api }
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    fn config(&self) -> &FactoryConfig {
        self.registry.config()
    }

    /// Start the cluster.
    ///
    /// Resolves when `interrupt` does, after rolling back, with
    /// `FactoryError::Interrupted`. Unless detached, client logs are copied
    /// into `output` until the client stops.
    pub async fn start<F, W>(&self, request: &StartRequest, interrupt: F, output: &mut W) -> Result<()>
    where
        F: Future<Output = ()>,
        W: AsyncWrite + Unpin + Send,
    {
        FactoryConfig::validate_host_count(i64::from(request.hosts))?;
        let client_image = self.config().codex_image(&request.codex_version)?;

        tokio::pin!(interrupt);

        let outcome = tokio::select! {
            result = self.bring_up(request, &client_image) => result,
            _ = &mut interrupt => {
                warn!("Interrupted, stopping started containers");
                Err(FactoryError::Interrupted)
            }
        };

        if let Err(e) = outcome {
            self.rollback().await;
            return Err(e);
        }

        if request.detach {
            return Ok(());
        }

        tokio::select! {
            result = self.stream_client_logs(output) => result,
            _ = &mut interrupt => {
                warn!("Interrupted, stopping started containers");
                self.rollback().await;
                Err(FactoryError::Interrupted)
            }
        }
    }

    async fn bring_up(&self, request: &StartRequest, client_image: &str) -> Result<()> {
        if self.registry.cluster_status().await?.all_running() {
            info!("All containers are up and running");
            return Ok(());
        }

        self.run_phase(Phase::Network, self.registry.create_network())
            .await?;
        self.run_phase(Phase::Blockchain, self.start_blockchain(request, client_image))
            .await?;
        let bootstrap_address = self
            .run_phase(Phase::Client, self.start_client(request))
            .await?;

        if request.hosts == 0 {
            debug!("No hosts requested");
            return Ok(());
        }

        self.run_phase(Phase::Hosts, self.start_hosts(request, &bootstrap_address))
            .await
    }

    async fn run_phase<T>(&self, phase: Phase, work: impl Future<Output = Result<T>>) -> Result<T> {
        info!("Starting {}", phase);

        match work.await {
            Ok(value) => {
                info!("{}", phase.success_message());
                Ok(value)
            }
            Err(e) => {
                error!("It was not possible to start {}: {}", phase, e);
                Err(e)
            }
        }
    }

    async fn start_blockchain(&self, request: &StartRequest, client_image: &str) -> Result<()> {
        let blockchain_image = self.registry.blockchain_image_for(client_image).await?;
        debug!("Using blockchain image {}", blockchain_image);

        let spec = ContainerSpec::blockchain(self.config(), &blockchain_image);
        self.registry.launch(&spec, request.options).await?;

        wait_for_blockchain(self.api.as_ref(), self.config().blockchain_poll).await
    }

    /// Returns the client's bootstrap address
    async fn start_client(&self, request: &StartRequest) -> Result<String> {
        let spec = ContainerSpec::client(self.config(), &request.codex_version)?;
        self.registry.launch(&spec, request.options).await?;

        let address = wait_for_client(&self.registry, self.api.as_ref(), self.config().client_poll).await?;
        debug!("Client node reachable at {}", address);
        Ok(address)
    }

    async fn start_hosts(&self, request: &StartRequest, bootstrap_address: &str) -> Result<()> {
        for index in 1..=request.hosts {
            let spec = ContainerSpec::host(
                self.config(),
                &request.codex_version,
                index,
                bootstrap_address,
            )?;
            self.registry.launch(&spec, request.options).await?;
        }

        wait_for_hosts(
            &self.registry,
            self.api.as_ref(),
            request.hosts,
            self.config().hosts_poll,
        )
        .await
    }

    async fn stream_client_logs<W>(&self, output: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self.registry.logs(ContainerRole::Client, true, None).await? {
            ContainerLogs::Follow(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    output.write_all(&chunk?).await?;
                    output.flush().await?;
                }
            }
            ContainerLogs::Buffered(bytes) => output.write_all(&bytes).await?,
        }

        Ok(())
    }

    /// Stop everything this session started; failures are only logged
    async fn rollback(&self) {
        match self.registry.running_set() {
            Ok(started) if started.is_empty() => {
                debug!("No containers were started, nothing to stop");
                return;
            }
            Ok(started) => info!("Stopping {} started containers", started.len()),
            Err(e) => warn!("Failed to read started containers: {}", e),
        }

        if let Err(e) = self.registry.stop_all(false, false).await {
            warn!("Failed to stop containers: {}", e);
        }
    }
}
