//! REST client for algod
//!
//! [`NodeClient`] is the seam the watch loop talks through; [`AlgodClient`]
//! implements it over HTTP.

use super::config::WatchConfig;
use super::metrics::{parse_prometheus, BlockHeader, BlockMetrics};
use super::participation::{GenerateKeyParams, ParticipationKey};
use crate::error::WatchError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Header carrying the algod API token
pub const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Build information from `/versions`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildVersion {
    pub major: u64,
    pub minor: u64,
    pub build_number: u64,
    #[serde(default)]
    pub commit_hash: String,
    #[serde(default)]
    pub branch: String,
    pub channel: String,
}

/// `/versions` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub build: BuildVersion,
    pub genesis_id: String,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// `/v2/status` and `/v2/status/wait-for-block-after` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusResponse {
    pub last_round: u64,
    /// Nanoseconds spent catching up; zero once caught up
    #[serde(default)]
    pub catchup_time: u64,
    /// Present only while a catchpoint (fast catchup) is being applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catchpoint_acquired_blocks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_node_vote: Option<bool>,
    #[serde(default)]
    pub time_since_last_round: u64,
}

/// `/v2/accounts/{address}` response (subset)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountInfo {
    pub address: String,
    /// Balance in microAlgos
    pub amount: u64,
    pub status: String,
    #[serde(default)]
    pub incentive_eligible: bool,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Operations the watcher needs from a node
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Node build and network (`/versions`)
    async fn get_version(&self) -> Result<VersionInfo, WatchError>;

    /// Current status (`/v2/status`)
    async fn get_status(&self) -> Result<StatusResponse, WatchError>;

    /// Long poll until a round after `after_round` is committed
    async fn wait_for_block(&self, after_round: u64) -> Result<StatusResponse, WatchError>;

    /// Average round time and TPS over the `window` rounds ending at `round`
    async fn get_block_metrics(&self, round: u64, window: u64) -> Result<BlockMetrics, WatchError>;

    /// Prometheus counters (`/metrics`)
    async fn get_network_metrics(&self) -> Result<HashMap<String, u64>, WatchError>;

    async fn list_participation_keys(&self) -> Result<Vec<ParticipationKey>, WatchError>;

    async fn get_participation_key(&self, id: &str) -> Result<ParticipationKey, WatchError>;

    /// Ask the node to generate keys; returns before generation completes
    async fn generate_participation_key(
        &self,
        address: &str,
        params: &GenerateKeyParams,
    ) -> Result<(), WatchError>;

    async fn delete_participation_key(&self, id: &str) -> Result<(), WatchError>;

    async fn get_account(&self, address: &str) -> Result<AccountInfo, WatchError>;
}

/// HTTP client for a single algod instance
pub struct AlgodClient {
    base: Url,
    token: Option<String>,
    http: Client,
}

impl AlgodClient {
    /// Create a client for `endpoint`, optionally authenticated with `token`
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, WatchError> {
        let mut base = Url::parse(endpoint)?;
        if base.cannot_be_a_base() {
            return Err(WatchError::InvalidArgument(format!(
                "endpoint {} cannot be used as a base url",
                endpoint
            )));
        }
        // Keep a path prefix (reverse proxy) when joining relative paths
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // No request timeout: wait-for-block is a server-bounded long poll
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| WatchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base, token, http })
    }

    /// Create a client from watcher config (endpoint and token discovery)
    pub fn from_config(config: &WatchConfig) -> Result<Self, WatchError> {
        let endpoint = config.effective_endpoint();
        let token = config.effective_token();
        if token.is_none() {
            log::warn!("No API token found for {}; admin features will be unavailable", endpoint);
        }
        Self::new(&endpoint, token)
    }

    /// The endpoint this client talks to
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, WatchError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, WatchError> {
        let mut req = self.http.request(method, self.url(path)?);
        if let Some(ref token) = self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        Ok(req)
    }

    /// Send a request and map non-success statuses into [`WatchError`]
    async fn send(&self, req: RequestBuilder) -> Result<Response, WatchError> {
        let response = req
            .send()
            .await
            .map_err(|e| WatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string()
            });
        Err(WatchError::from_status(status.as_u16(), message))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, WatchError> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        response
            .json()
            .await
            .map_err(|e| WatchError::Decode(format!("{}: {}", path, e)))
    }

    async fn get_block_header(&self, round: u64) -> Result<BlockHeader, WatchError> {
        let req = self
            .request(Method::GET, &format!("v2/blocks/{}", round))?
            .query(&[("format", "json")]);
        let response = self.send(req).await?;
        let block: BlockResponse = response
            .json()
            .await
            .map_err(|e| WatchError::Decode(format!("block {}: {}", round, e)))?;
        Ok(block.block)
    }
}

#[async_trait]
impl NodeClient for AlgodClient {
    async fn get_version(&self) -> Result<VersionInfo, WatchError> {
        self.get_json("versions").await
    }

    async fn get_status(&self) -> Result<StatusResponse, WatchError> {
        self.get_json("v2/status").await
    }

    async fn wait_for_block(&self, after_round: u64) -> Result<StatusResponse, WatchError> {
        self.get_json(&format!("v2/status/wait-for-block-after/{}", after_round))
            .await
    }

    async fn get_block_metrics(&self, round: u64, window: u64) -> Result<BlockMetrics, WatchError> {
        let base_round = round.saturating_sub(window).max(1);
        if base_round >= round {
            return Ok(BlockMetrics::default());
        }

        let newer = self.get_block_header(round).await?;
        let older = self.get_block_header(base_round).await?;
        Ok(BlockMetrics::between(&newer, &older))
    }

    async fn get_network_metrics(&self) -> Result<HashMap<String, u64>, WatchError> {
        let response = self.send(self.request(Method::GET, "metrics")?).await?;
        let body = response
            .text()
            .await
            .map_err(|e| WatchError::Decode(format!("metrics: {}", e)))?;
        Ok(parse_prometheus(&body))
    }

    async fn list_participation_keys(&self) -> Result<Vec<ParticipationKey>, WatchError> {
        self.get_json("v2/participation").await
    }

    async fn get_participation_key(&self, id: &str) -> Result<ParticipationKey, WatchError> {
        self.get_json(&format!("v2/participation/{}", id)).await
    }

    async fn generate_participation_key(
        &self,
        address: &str,
        params: &GenerateKeyParams,
    ) -> Result<(), WatchError> {
        let mut query = vec![
            ("first", params.first.to_string()),
            ("last", params.last.to_string()),
        ];
        if let Some(dilution) = params.dilution {
            query.push(("dilution", dilution.to_string()));
        }

        let req = self
            .request(Method::POST, &format!("v2/participation/generate/{}", address))?
            .query(&query);
        self.send(req).await?;
        Ok(())
    }

    async fn delete_participation_key(&self, id: &str) -> Result<(), WatchError> {
        let req = self.request(Method::DELETE, &format!("v2/participation/{}", id))?;
        self.send(req).await?;
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<AccountInfo, WatchError> {
        let req = self
            .request(Method::GET, &format!("v2/accounts/{}", address))?
            .query(&[("exclude", "all")]);
        let response = self.send(req).await?;
        response
            .json()
            .await
            .map_err(|e| WatchError::Decode(format!("account {}: {}", address, e)))
    }
}
