//! Factory configuration
//!
//! A `FactoryConfig` is built once at process entry and handed to the
//! registry and the orchestrator. Nothing below this module reads the
//! process environment.

use crate::error::{FactoryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default prefix for container and network names
pub const DEFAULT_ENV_PREFIX: &str = "codex-factory";
/// Default image name inside the repository
pub const DEFAULT_IMAGE_PREFIX: &str = "nim-codex";
/// Default Docker repository
pub const DEFAULT_REPO: &str = "codexstorage";
/// Largest supported number of host nodes
pub const MAX_HOSTS: u8 = 4;

/// Options for a single start invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Remove each role's existing container before reconciling it
    pub fresh: bool,
}

/// Bounds for one readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Number of probe attempts before giving up
    pub max_iterations: u32,
    /// Sleep between attempts
    pub interval: Duration,
}

impl PollSettings {
    pub fn new(max_iterations: u32, interval: Duration) -> Self {
        Self {
            max_iterations,
            interval,
        }
    }
}

/// Endpoints the readiness probes talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeEndpoints {
    /// JSON-RPC endpoint of the blockchain node
    pub blockchain_rpc: String,
    /// REST API of the client node
    pub client_api: String,
}

impl Default for ProbeEndpoints {
    fn default() -> Self {
        Self {
            blockchain_rpc: "http://127.0.0.1:8545".to_string(),
            client_api: "http://127.0.0.1:8080".to_string(),
        }
    }
}

/// Factory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Prefix of every container and network name
    pub env_prefix: String,
    /// Image name of the Codex node
    pub image_prefix: String,
    /// Docker repository hosting the Codex images
    pub repo: Option<String>,
    /// Probe endpoints
    pub endpoints: ProbeEndpoints,
    /// Blockchain readiness bounds
    pub blockchain_poll: PollSettings,
    /// Client readiness bounds
    pub client_poll: PollSettings,
    /// Host mesh readiness bounds
    pub hosts_poll: PollSettings,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            repo: Some(DEFAULT_REPO.to_string()),
            endpoints: ProbeEndpoints::default(),
            blockchain_poll: PollSettings::new(90, Duration::from_secs(1)),
            client_poll: PollSettings::new(300, Duration::from_secs(1)),
            hosts_poll: PollSettings::new(300, Duration::from_secs(1)),
        }
    }
}

impl FactoryConfig {
    /// Create a configuration with the given name prefix
    pub fn new(env_prefix: &str) -> Self {
        Self {
            env_prefix: env_prefix.to_string(),
            ..Self::default()
        }
    }

    /// Set image prefix
    pub fn image_prefix(mut self, image_prefix: &str) -> Self {
        self.image_prefix = image_prefix.to_string();
        self
    }

    /// Set repository
    pub fn repo(mut self, repo: Option<String>) -> Self {
        self.repo = repo;
        self
    }

    /// Set probe endpoints
    pub fn endpoints(mut self, endpoints: ProbeEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Use the same poll bounds for every readiness wait
    pub fn poll_all(mut self, settings: PollSettings) -> Self {
        self.blockchain_poll = settings;
        self.client_poll = settings;
        self.hosts_poll = settings;
        self
    }

    /// Name of the cluster network
    pub fn network_name(&self) -> String {
        format!("{}-network", self.env_prefix)
    }

    /// Full reference of the Codex image for a version
    pub fn codex_image(&self, codex_version: &str) -> Result<String> {
        let repo = self
            .repo
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| FactoryError::MissingRepo(format!("{}:{}", self.image_prefix, codex_version)))?;

        Ok(format!("{}/{}:{}", repo, self.image_prefix, codex_version))
    }

    /// Reject host counts outside `0..=MAX_HOSTS`
    pub fn validate_host_count(hosts: i64) -> Result<u8> {
        if !(0..=MAX_HOSTS as i64).contains(&hosts) {
            return Err(FactoryError::InvalidConfig(format!(
                "Host count has to be between 0 and {} including, got {}",
                MAX_HOSTS, hosts
            )));
        }

        Ok(hosts as u8)
    }
}
