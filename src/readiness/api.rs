//! HTTP APIs of the cluster nodes

use crate::config::ProbeEndpoints;
use crate::error::{FactoryError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Chain id of the local development chain
pub const EXPECTED_CHAIN_ID: &str = "0x7a69";

/// Path of the node debug endpoint
const DEBUG_INFO_PATH: &str = "/api/codex/v1/debug/info";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Subset of a node's debug/info response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Multiaddresses the node announces
    #[serde(default)]
    pub addrs: Vec<String>,
    /// Discovery table
    #[serde(default)]
    pub table: PeerTable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerTable {
    #[serde(default)]
    pub nodes: Vec<Value>,
}

/// Endpoints the readiness probes query
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Chain id reported over JSON-RPC, `None` if the answer is unusable
    async fn chain_id(&self) -> Result<Option<String>>;

    /// Debug information of the client node
    async fn debug_info(&self) -> Result<DebugInfo>;
}

/// `NodeApi` over plain HTTP
pub struct HttpNodeApi {
    client: reqwest::Client,
    endpoints: ProbeEndpoints,
}

impl HttpNodeApi {
    pub fn new(endpoints: ProbeEndpoints) -> Result<Self> {
        // The nodes publish their ports on the loopback interface
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;

        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn chain_id(&self) -> Result<Option<String>> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": "eth_chainId",
            "id": 1,
        });

        let response = self
            .client
            .post(&self.endpoints.blockchain_rpc)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let Ok(body) = response.json::<Value>().await else {
            return Ok(None);
        };

        Ok(body
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn debug_info(&self) -> Result<DebugInfo> {
        let url = format!(
            "{}{}",
            self.endpoints.client_api.trim_end_matches('/'),
            DEBUG_INFO_PATH
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        // A proxy in front of a node that is still booting answers 502
        if status == StatusCode::BAD_GATEWAY {
            response.error_for_status_ref()?;
        }

        if !status.is_success() {
            return Err(FactoryError::Api(format!(
                "debug/info returned {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        Ok(response.json().await?)
    }
}
