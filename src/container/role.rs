//! Cluster roles and their observed status

use crate::config::MAX_HOSTS;
use crate::error::{FactoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed member kind of the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    /// Local EVM chain the marketplace contracts live on
    Blockchain,
    /// Client storage node, also the bootstrap node of the mesh
    Client,
    /// Storage provider node, numbered `1..=MAX_HOSTS`
    Host(u8),
}

impl ContainerRole {
    /// Every role in start order
    pub const ALL: [ContainerRole; 6] = [
        ContainerRole::Blockchain,
        ContainerRole::Client,
        ContainerRole::Host(1),
        ContainerRole::Host(2),
        ContainerRole::Host(3),
        ContainerRole::Host(4),
    ];

    /// Host role for a 1-based index
    pub fn host(index: u8) -> Result<Self> {
        if index == 0 || index > MAX_HOSTS {
            return Err(FactoryError::InvalidConfig(format!(
                "Host index has to be between 1 and {}, got {}",
                MAX_HOSTS, index
            )));
        }
        Ok(ContainerRole::Host(index))
    }

    /// Container name for this role under a prefix
    pub fn container_name(&self, env_prefix: &str) -> String {
        match self {
            ContainerRole::Blockchain => format!("{}-blockchain", env_prefix),
            ContainerRole::Client => format!("{}-client", env_prefix),
            ContainerRole::Host(n) => format!("{}-host-{}", env_prefix, n),
        }
    }
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRole::Blockchain => write!(f, "blockchain"),
            ContainerRole::Client => write!(f, "client"),
            ContainerRole::Host(1) => write!(f, "host"),
            ContainerRole::Host(n) => write!(f, "host{}", n),
        }
    }
}

impl FromStr for ContainerRole {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blockchain" => Ok(ContainerRole::Blockchain),
            "client" => Ok(ContainerRole::Client),
            "host" => Ok(ContainerRole::Host(1)),
            other => other
                .strip_prefix("host")
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (2..=MAX_HOSTS).contains(n))
                .map(ContainerRole::Host)
                .ok_or_else(|| {
                    FactoryError::InvalidConfig(format!(
                        "Unknown container \"{}\", valid values: {}",
                        other,
                        ContainerRole::ALL.map(|r| r.to_string()).join(", ")
                    ))
                }),
        }
    }
}

/// Observed state of one role's container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerStatus {
    /// No container with the role's name exists
    NotFound,
    /// The container exists but is not running
    Exists,
    /// The daemon reports the container running
    Running,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::NotFound => write!(f, "not-found"),
            ContainerStatus::Exists => write!(f, "exists"),
            ContainerStatus::Running => write!(f, "running"),
        }
    }
}

/// Snapshot of every role's status.
///
/// Each field is queried independently; the snapshot is not atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub blockchain: ContainerStatus,
    pub client: ContainerStatus,
    pub host: ContainerStatus,
    pub host_2: ContainerStatus,
    pub host_3: ContainerStatus,
    pub host_4: ContainerStatus,
}

impl ClusterStatus {
    /// A snapshot where nothing exists
    pub fn not_found() -> Self {
        Self {
            blockchain: ContainerStatus::NotFound,
            client: ContainerStatus::NotFound,
            host: ContainerStatus::NotFound,
            host_2: ContainerStatus::NotFound,
            host_3: ContainerStatus::NotFound,
            host_4: ContainerStatus::NotFound,
        }
    }

    /// Status of a single role
    pub fn get(&self, role: ContainerRole) -> ContainerStatus {
        match role {
            ContainerRole::Blockchain => self.blockchain,
            ContainerRole::Client => self.client,
            ContainerRole::Host(1) => self.host,
            ContainerRole::Host(2) => self.host_2,
            ContainerRole::Host(3) => self.host_3,
            ContainerRole::Host(4) => self.host_4,
            ContainerRole::Host(_) => ContainerStatus::NotFound,
        }
    }

    /// Record the status of a single role
    pub fn set(&mut self, role: ContainerRole, status: ContainerStatus) {
        let slot = match role {
            ContainerRole::Blockchain => &mut self.blockchain,
            ContainerRole::Client => &mut self.client,
            ContainerRole::Host(1) => &mut self.host,
            ContainerRole::Host(2) => &mut self.host_2,
            ContainerRole::Host(3) => &mut self.host_3,
            ContainerRole::Host(4) => &mut self.host_4,
            // no slot outside 1..=MAX_HOSTS
            ContainerRole::Host(_) => return,
        };
        *slot = status;
    }

    /// Role and status pairs in start order
    pub fn iter(&self) -> impl Iterator<Item = (ContainerRole, ContainerStatus)> + '_ {
        ContainerRole::ALL.into_iter().map(|role| (role, self.get(role)))
    }

    /// Whether every role is running
    pub fn all_running(&self) -> bool {
        self.iter().all(|(_, status)| status == ContainerStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_names() {
        assert_eq!(ContainerRole::Blockchain.container_name("cf"), "cf-blockchain");
        assert_eq!(ContainerRole::Client.container_name("cf"), "cf-client");
        assert_eq!(ContainerRole::Host(3).container_name("cf"), "cf-host-3");
    }

    #[test]
    fn test_host_bounds() {
        assert!(ContainerRole::host(0).is_err());
        assert!(ContainerRole::host(5).is_err());
        assert_eq!(ContainerRole::host(4).unwrap(), ContainerRole::Host(4));
    }

    #[test]
    fn test_role_names_round_trip() {
        for role in ContainerRole::ALL {
            assert_eq!(role.to_string().parse::<ContainerRole>().unwrap(), role);
        }
        assert!("host5".parse::<ContainerRole>().is_err());
        assert!("host1".parse::<ContainerRole>().is_err());
    }

    #[test]
    fn test_cluster_status_shape() {
        let mut status = ClusterStatus::not_found();
        assert!(!status.all_running());

        for role in ContainerRole::ALL {
            status.set(role, ContainerStatus::Running);
        }
        assert!(status.all_running());

        status.set(ContainerRole::Host(3), ContainerStatus::Exists);
        assert_eq!(status.host_3, ContainerStatus::Exists);
        assert_eq!(status.get(ContainerRole::Host(3)), ContainerStatus::Exists);
        assert!(!status.all_running());
    }

    #[test]
    fn test_cluster_status_ignores_unknown_hosts() {
        let mut status = ClusterStatus::not_found();
        status.set(ContainerRole::Host(4), ContainerStatus::Running);

        status.set(ContainerRole::Host(9), ContainerStatus::Exists);
        status.set(ContainerRole::Host(0), ContainerStatus::Exists);

        assert_eq!(status.host_4, ContainerStatus::Running);
        assert_eq!(status.get(ContainerRole::Host(9)), ContainerStatus::NotFound);
        assert_eq!(status.get(ContainerRole::Host(0)), ContainerStatus::NotFound);
        assert_eq!(status.iter().filter(|(_, s)| *s != ContainerStatus::NotFound).count(), 1);
    }
}
