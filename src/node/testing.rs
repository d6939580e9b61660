//! Scripted node and release feed used by the unit tests

use super::metrics::{BlockMetrics, RECEIVED_BYTES_COUNTER, SENT_BYTES_COUNTER};
use super::participation::{GenerateKeyParams, KeyMaterial, ParticipationKey};
use super::releases::ReleaseFeed;
use super::rpc::{AccountInfo, BuildVersion, NodeClient, StatusResponse, VersionInfo};
use crate::error::WatchError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Queue of scripted results; the last one repeats forever
pub struct Script<T: Clone>(Mutex<VecDeque<Result<T, WatchError>>>);

impl<T: Clone> Script<T> {
    pub fn new() -> Self {
        Self(Mutex::new(VecDeque::new()))
    }

    pub fn with(result: Result<T, WatchError>) -> Self {
        let script = Self::new();
        script.push(result);
        script
    }

    pub fn push(&self, result: Result<T, WatchError>) {
        self.0.lock().unwrap().push_back(result);
    }

    /// Replace the whole script with a single repeating result
    pub fn set(&self, result: Result<T, WatchError>) {
        let mut queue = self.0.lock().unwrap();
        queue.clear();
        queue.push_back(result);
    }

    pub fn next(&self) -> Result<T, WatchError> {
        let mut queue = self.0.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(WatchError::Transport("unscripted call".to_string())))
        }
    }

    pub fn peek(&self) -> Result<T, WatchError> {
        self.0
            .lock()
            .unwrap()
            .front()
            .cloned()
            .unwrap_or_else(|| Err(WatchError::Transport("unscripted call".to_string())))
    }
}

pub fn status(last_round: u64, catchup_time: u64, acquired: Option<u64>) -> StatusResponse {
    StatusResponse {
        last_round,
        catchup_time,
        catchpoint_acquired_blocks: acquired,
        ..Default::default()
    }
}

pub fn version(channel: &str) -> VersionInfo {
    VersionInfo {
        build: BuildVersion {
            major: 3,
            minor: 26,
            build_number: 0,
            channel: channel.to_string(),
            ..Default::default()
        },
        genesis_id: "testnet-v1.0".to_string(),
        versions: vec!["v2".to_string()],
    }
}

pub fn key(id: &str, address: &str, first: u64, last: u64) -> ParticipationKey {
    ParticipationKey {
        id: id.to_string(),
        address: address.to_string(),
        key: KeyMaterial {
            vote_first_valid: first,
            vote_last_valid: last,
            vote_key_dilution: 100,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn counters(sent: u64, received: u64) -> HashMap<String, u64> {
    HashMap::from([
        (SENT_BYTES_COUNTER.to_string(), sent),
        (RECEIVED_BYTES_COUNTER.to_string(), received),
    ])
}

/// In-memory [`NodeClient`] driven by scripts
pub struct MockNode {
    pub version: Script<VersionInfo>,
    pub statuses: Script<StatusResponse>,
    pub waits: Script<StatusResponse>,
    pub block_metrics: Script<BlockMetrics>,
    pub network: Script<HashMap<String, u64>>,
    pub keys: Script<Vec<ParticipationKey>>,
    pub generates: Script<()>,
    pub deletes: Script<()>,
    pub accounts: Mutex<HashMap<String, AccountInfo>>,
    pub generated: Mutex<Vec<(String, GenerateKeyParams)>>,
    pub deleted: Mutex<Vec<String>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            version: Script::with(Ok(version("stable"))),
            statuses: Script::with(Ok(status(1000, 0, None))),
            waits: Script::new(),
            block_metrics: Script::with(Ok(BlockMetrics {
                avg_round_time: Duration::from_millis(2800),
                tps: 12.5,
            })),
            network: Script::with(Ok(counters(1000, 2000))),
            keys: Script::with(Ok(Vec::new())),
            generates: Script::with(Ok(())),
            deletes: Script::with(Ok(())),
            accounts: Mutex::new(HashMap::new()),
            generated: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_account(&self, address: &str, amount: u64) {
        self.accounts.lock().unwrap().insert(
            address.to_string(),
            AccountInfo {
                address: address.to_string(),
                amount,
                status: "Online".to_string(),
                incentive_eligible: true,
            },
        );
    }

    /// Number of calls made to `op`
    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn get_version(&self) -> Result<VersionInfo, WatchError> {
        self.record("get_version");
        self.version.next()
    }

    async fn get_status(&self) -> Result<StatusResponse, WatchError> {
        self.record("get_status");
        self.statuses.next()
    }

    async fn wait_for_block(&self, _after_round: u64) -> Result<StatusResponse, WatchError> {
        self.record("wait_for_block");
        // Let other tasks run, as a real long poll would
        tokio::task::yield_now().await;
        self.waits.next()
    }

    async fn get_block_metrics(&self, _round: u64, _window: u64) -> Result<BlockMetrics, WatchError> {
        self.record("get_block_metrics");
        self.block_metrics.next()
    }

    async fn get_network_metrics(&self) -> Result<HashMap<String, u64>, WatchError> {
        self.record("get_network_metrics");
        self.network.next()
    }

    async fn list_participation_keys(&self) -> Result<Vec<ParticipationKey>, WatchError> {
        self.record("list_participation_keys");
        self.keys.next()
    }

    async fn get_participation_key(&self, id: &str) -> Result<ParticipationKey, WatchError> {
        self.record("get_participation_key");
        self.keys
            .peek()?
            .into_iter()
            .find(|k| k.id == id)
            .ok_or_else(|| WatchError::NotFound(format!("participation key {}", id)))
    }

    async fn generate_participation_key(
        &self,
        address: &str,
        params: &GenerateKeyParams,
    ) -> Result<(), WatchError> {
        self.record("generate_participation_key");
        self.generates.next()?;
        self.generated
            .lock()
            .unwrap()
            .push((address.to_string(), params.clone()));
        Ok(())
    }

    async fn delete_participation_key(&self, id: &str) -> Result<(), WatchError> {
        self.record("delete_participation_key");
        self.deletes.next()?;
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<AccountInfo, WatchError> {
        self.record("get_account");
        self.accounts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| WatchError::NotFound(format!("account {}", address)))
    }
}

/// Release feed returning a fixed answer
pub struct StaticReleases {
    pub latest: Result<Option<String>, WatchError>,
    calls: AtomicUsize,
}

impl StaticReleases {
    pub fn new(latest: Result<Option<String>, WatchError>) -> Self {
        Self {
            latest,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseFeed for StaticReleases {
    async fn latest_release(&self, _channel: &str) -> Result<Option<String>, WatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.latest.clone()
    }
}
