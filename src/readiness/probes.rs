//! Readiness probes of the cluster components

use super::api::{NodeApi, EXPECTED_CHAIN_ID};
use super::poller::{poll_until_ready, Probe};
use crate::config::PollSettings;
use crate::container::{ContainerRegistry, ContainerRole, ContainerStatus};
use crate::error::{FactoryError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

/// Address fragment marking a loopback multiaddress
const LOOPBACK: &str = "127.0.0.1";

fn multiaddr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/ip4/([\d.]+)/tcp/(\d+)").expect("valid multiaddr pattern"))
}

/// Ready once the chain answers with the expected chain id
pub struct BlockchainProbe<'a> {
    api: &'a dyn NodeApi,
}

impl<'a> BlockchainProbe<'a> {
    pub fn new(api: &'a dyn NodeApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<'a> Probe for BlockchainProbe<'a> {
    type Output = ();

    async fn probe(&mut self) -> Result<Option<()>> {
        let chain_id = self.api.chain_id().await?;
        Ok(chain_id.filter(|id| id == EXPECTED_CHAIN_ID).map(|_| ()))
    }
}

/// Ready once the client announces a non-loopback address; yields its IPv4 host
pub struct ClientProbe<'a> {
    registry: &'a ContainerRegistry,
    api: &'a dyn NodeApi,
}

impl<'a> ClientProbe<'a> {
    pub fn new(registry: &'a ContainerRegistry, api: &'a dyn NodeApi) -> Self {
        Self { registry, api }
    }
}

#[async_trait]
impl<'a> Probe for ClientProbe<'a> {
    type Output = String;

    async fn probe(&mut self) -> Result<Option<String>> {
        if self.registry.status_of(ContainerRole::Client).await? != ContainerStatus::Running {
            return Err(FactoryError::ContainerNotRunning(
                ContainerRole::Client.container_name(&self.registry.config().env_prefix),
            ));
        }

        let info = self.api.debug_info().await?;
        let Some(address) = info.addrs.iter().find(|a| !a.contains(LOOPBACK)) else {
            return Ok(None);
        };

        multiaddr_regex()
            .captures(address)
            .and_then(|c| c.get(1))
            .map(|ip| Some(ip.as_str().to_string()))
            .ok_or_else(|| FactoryError::UnsupportedMultiaddr(address.clone()))
    }
}

/// Ready once the client's discovery table holds at least `expected` peers
pub struct HostMeshProbe<'a> {
    api: &'a dyn NodeApi,
    expected: usize,
}

impl<'a> HostMeshProbe<'a> {
    pub fn new(api: &'a dyn NodeApi, expected: usize) -> Self {
        Self { api, expected }
    }
}

#[async_trait]
impl<'a> Probe for HostMeshProbe<'a> {
    type Output = ();

    async fn probe(&mut self) -> Result<Option<()>> {
        let info = self.api.debug_info().await?;
        Ok((info.table.nodes.len() >= self.expected).then_some(()))
    }
}

/// Wait for the blockchain node's RPC
pub async fn wait_for_blockchain(api: &dyn NodeApi, settings: PollSettings) -> Result<()> {
    info!("Waiting for the blockchain node to be ready");
    poll_until_ready("blockchain", &mut BlockchainProbe::new(api), settings).await
}

/// Wait for the client node and return its bootstrap address
pub async fn wait_for_client(
    registry: &ContainerRegistry,
    api: &dyn NodeApi,
    settings: PollSettings,
) -> Result<String> {
    info!("Waiting for the client node to be ready");
    poll_until_ready("client", &mut ClientProbe::new(registry, api), settings).await
}

/// Wait until the client sees every host.
///
/// All `hosts` containers must already be running; a missing one fails
/// immediately.
pub async fn wait_for_hosts(
    registry: &ContainerRegistry,
    api: &dyn NodeApi,
    hosts: u8,
    settings: PollSettings,
) -> Result<()> {
    for index in 1..=hosts {
        let role = ContainerRole::host(index)?;
        if registry.status_of(role).await? != ContainerStatus::Running {
            return Err(FactoryError::ContainerNotRunning(
                role.container_name(&registry.config().env_prefix),
            ));
        }
    }

    info!("Waiting for hosts to connect to the client");
    let mut probe = HostMeshProbe::new(api, usize::from(hosts));
    poll_until_ready("hosts", &mut probe, settings).await
}
