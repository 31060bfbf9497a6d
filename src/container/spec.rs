//! Container specifications derived from a role

use super::role::ContainerRole;
use crate::config::FactoryConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Port of the blockchain JSON-RPC endpoint
pub const BLOCKCHAIN_RPC_PORT: u16 = 8545;
/// Base of the REST API ports, offset by node index
pub const API_PORT_BASE: u16 = 8080;
/// Base of the peer listen ports, offset by node index
pub const LISTEN_PORT_BASE: u16 = 8070;
/// Base of the discovery ports, offset by node index
pub const DISCOVERY_PORT_BASE: u16 = 8090;

/// Marketplace contract deployed by the blockchain image
pub const MARKETPLACE_ADDRESS: &str = "0x322813Fd9A801c5507c9de605d63CEA4f2CE6c44";

/// Prefix of every Codex option environment variable
const CODEX_ENV_PREFIX: &str = "CODEX_";

/// Well-known funded test accounts: deployer, client, then hosts
pub const FUNDED_ACCOUNTS: [&str; 20] = [
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
    "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
    "0x90F79bf6EB2c4f870365E785982E1f101E93b906",
    "0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65",
    "0x9965507D1a55bcC2695C58ba16FB37d819B0A4dc",
    "0x976EA74026E726554dB657fA54763abd0C3a0aa9",
    "0x14dC79964da2C08b23698B3D3cc7Ca32193d9955",
    "0x23618e81E3f5cdF7f54C3d65f7FBc0aBf5B21E8f",
    "0xa0Ee7A142d267C1f36714E4a8F75612F20a79720",
    "0xBcd4042DE499D14e55001CcbB24a551F3b954096",
    "0x71bE63f3384f5fb98995898A86B02Fb2426c5788",
    "0xFABB0ac9d68B0B445fB7357272Ff202C5651694a",
    "0x1CBd3b2770909D4e10f157cABC84C7264073C9Ec",
    "0xdF3e18d64BC6A983f673Ab319CCaE4f1a57C7097",
    "0xcd3B766CCDd6AE721141F452C550Ca635964ce71",
    "0x2546BcD3c84621e976D8185a91A922aE77ECEc30",
    "0xbDA5747bFD65F08deb54cb465eB87D40e51B197E",
    "0xdD2FD4581271e230360230F9337D5c0430Bf44C0",
    "0x8626f6940E2eb28930eFb4CeF49B2d1F2C9C1199",
];

/// Transport protocol of an exposed port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// A port exposed by the container and published on the same host port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortSpec {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }

    /// Docker's `port/proto` key
    pub fn key(&self) -> String {
        format!("{}/{}", self.port, self.protocol)
    }
}

/// Everything needed to create one role's container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Stable container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Command override, empty for the image default
    pub cmd: Vec<String>,
    /// `KEY=value` environment entries
    pub env: Vec<String>,
    /// Exposed and published ports
    pub ports: Vec<PortSpec>,
    /// Network the container attaches to
    pub network: String,
    /// Allocate a TTY
    pub tty: bool,
}

impl ContainerSpec {
    /// Spec of the blockchain node; its image comes from the client image's labels
    pub fn blockchain(config: &FactoryConfig, blockchain_image: &str) -> Self {
        Self {
            name: ContainerRole::Blockchain.container_name(&config.env_prefix),
            image: blockchain_image.to_string(),
            cmd: Vec::new(),
            env: Vec::new(),
            ports: vec![PortSpec::tcp(BLOCKCHAIN_RPC_PORT)],
            network: config.network_name(),
            tty: false,
        }
    }

    /// Spec of the client node
    pub fn client(config: &FactoryConfig, codex_version: &str) -> Result<Self> {
        Ok(Self {
            name: ContainerRole::Client.container_name(&config.env_prefix),
            image: config.codex_image(codex_version)?,
            cmd: vec!["codex".to_string(), "persistence".to_string()],
            env: codex_env(config, 0, None),
            ports: node_ports(0),
            network: config.network_name(),
            tty: true,
        })
    }

    /// Spec of host `index`, bootstrapping from the client's address
    pub fn host(
        config: &FactoryConfig,
        codex_version: &str,
        index: u8,
        bootstrap_address: &str,
    ) -> Result<Self> {
        let role = ContainerRole::host(index)?;

        Ok(Self {
            name: role.container_name(&config.env_prefix),
            image: config.codex_image(codex_version)?,
            cmd: vec![
                "codex".to_string(),
                "persistence".to_string(),
                "prover".to_string(),
            ],
            env: codex_env(config, index, Some(bootstrap_address)),
            ports: node_ports(index),
            network: config.network_name(),
            tty: false,
        })
    }
}

fn node_ports(index: u8) -> Vec<PortSpec> {
    let offset = u16::from(index);
    vec![
        PortSpec::tcp(LISTEN_PORT_BASE + offset),
        PortSpec::tcp(API_PORT_BASE + offset),
        PortSpec::udp(DISCOVERY_PORT_BASE + offset),
    ]
}

/// Translate the node option map into environment variables
fn codex_env(config: &FactoryConfig, index: u8, bootstrap_address: Option<&str>) -> Vec<String> {
    let offset = u16::from(index);
    let account = FUNDED_ACCOUNTS[usize::from(index) + 1];
    let blockchain = ContainerRole::Blockchain.container_name(&config.env_prefix);

    let options = [
        ("api-bindaddr", "0.0.0.0".to_string()),
        ("api-cors-origin", "*".to_string()),
        ("api-port", (API_PORT_BASE + offset).to_string()),
        ("disc-port", (DISCOVERY_PORT_BASE + offset).to_string()),
        ("eth-account", account.to_string()),
        ("eth-provider", format!("http://{}:{}", blockchain, BLOCKCHAIN_RPC_PORT)),
        ("listen-addrs", format!("/ip4/0.0.0.0/tcp/{}", LISTEN_PORT_BASE + offset)),
        ("log-level", "NOTICE; TRACE: marketplace,sales,node,restapi".to_string()),
        ("marketplace-address", MARKETPLACE_ADDRESS.to_string()),
        ("validator", "true".to_string()),
        ("validator-max-slots", "1000".to_string()),
    ];

    let mut env: Vec<String> = options
        .iter()
        .map(|(key, value)| {
            format!(
                "{}{}={}",
                CODEX_ENV_PREFIX,
                key.to_uppercase().replace('-', "_"),
                value
            )
        })
        .collect();

    if let Some(address) = bootstrap_address {
        env.push(format!("BOOTSTRAP_NODE_URL={}:{}", address, API_PORT_BASE));
    }

    env.push("NAT_IP_AUTO=true".to_string());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FactoryConfig {
        FactoryConfig::new("cf")
    }

    #[test]
    fn test_blockchain_spec() {
        let spec = ContainerSpec::blockchain(&config(), "codexstorage/hardhat:1");
        assert_eq!(spec.name, "cf-blockchain");
        assert_eq!(spec.image, "codexstorage/hardhat:1");
        assert_eq!(spec.ports, vec![PortSpec::tcp(8545)]);
        assert_eq!(spec.network, "cf-network");
    }

    #[test]
    fn test_client_spec() {
        let spec = ContainerSpec::client(&config(), "0.2.0").unwrap();
        assert_eq!(spec.name, "cf-client");
        assert_eq!(spec.image, "codexstorage/nim-codex:0.2.0");
        assert_eq!(spec.ports.iter().map(PortSpec::key).collect::<Vec<_>>(), vec!["8070/tcp", "8080/tcp", "8090/udp"]);
        assert!(spec.env.contains(&"CODEX_API_PORT=8080".to_string()));
        assert!(spec.env.contains(&format!("CODEX_ETH_ACCOUNT={}", FUNDED_ACCOUNTS[1])));
        assert!(spec.env.contains(&"CODEX_ETH_PROVIDER=http://cf-blockchain:8545".to_string()));
        assert!(spec.env.contains(&"NAT_IP_AUTO=true".to_string()));
        assert!(!spec.env.iter().any(|e| e.starts_with("BOOTSTRAP_NODE_URL")));
    }

    #[test]
    fn test_host_spec_offsets() {
        let spec = ContainerSpec::host(&config(), "0.2.0", 3, "172.18.0.3").unwrap();
        assert_eq!(spec.name, "cf-host-3");
        assert_eq!(spec.ports.iter().map(PortSpec::key).collect::<Vec<_>>(), vec!["8073/tcp", "8083/tcp", "8093/udp"]);
        assert!(spec.env.contains(&"CODEX_LISTEN_ADDRS=/ip4/0.0.0.0/tcp/8073".to_string()));
        assert!(spec.env.contains(&"CODEX_VALIDATOR_MAX_SLOTS=1000".to_string()));
        assert!(spec.env.contains(&format!("CODEX_ETH_ACCOUNT={}", FUNDED_ACCOUNTS[4])));
        assert!(spec.env.contains(&"BOOTSTRAP_NODE_URL=172.18.0.3:8080".to_string()));
    }

    #[test]
    fn test_host_spec_rejects_out_of_range_index() {
        assert!(ContainerSpec::host(&config(), "0.2.0", 5, "172.18.0.3").is_err());
    }
}
