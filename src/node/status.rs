//! Node status tracking
//!
//! Holds lifecycle state, version and last round of the watched node.

use super::releases::ReleaseFeed;
use super::rpc::{BuildVersion, NodeClient, StatusResponse};
use crate::error::WatchError;
use serde::Serialize;
use std::fmt;

/// Node lifecycle, derived from the latest status response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// No status observed yet
    #[default]
    Unknown,
    /// Caught up and following the chain
    Stable,
    /// Replaying blocks to catch up
    Syncing,
    /// Applying a catchpoint snapshot
    FastCatchup,
}

impl LifecycleState {
    /// Derive the state from a status response's catchup fields
    pub fn from_catchup(catchup_time: u64, acquired_blocks: Option<u64>) -> Self {
        match (catchup_time, acquired_blocks) {
            (0, _) => LifecycleState::Stable,
            (_, Some(_)) => LifecycleState::FastCatchup,
            (_, None) => LifecycleState::Syncing,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unknown => "UNKNOWN",
            LifecycleState::Stable => "RUNNING",
            LifecycleState::Syncing => "SYNCING",
            LifecycleState::FastCatchup => "FAST-CATCHUP",
        };
        f.write_str(s)
    }
}

/// Current status of the watched node
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub state: LifecycleState,

    /// Build version, `None` until fetched (or after [`NodeStatus::reset_version`])
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Genesis id (e.g. "mainnet-v1.0")
    pub network: String,

    /// Whether the node votes for the pending protocol upgrade
    pub voting: bool,

    /// Whether a newer release exists on the node's channel
    pub needs_update: bool,

    pub last_round: u64,
}

impl NodeStatus {
    /// Apply a status observation
    ///
    /// `upgrade_vote` overwrites the voting flag only when present.
    pub fn update(
        &mut self,
        last_round: u64,
        catchup_time: u64,
        acquired_blocks: Option<u64>,
        upgrade_vote: Option<bool>,
    ) {
        self.last_round = last_round;
        self.state = LifecycleState::from_catchup(catchup_time, acquired_blocks);
        if let Some(vote) = upgrade_vote {
            self.voting = vote;
        }
    }

    /// Apply a status response from algod
    pub fn apply(&mut self, status: &StatusResponse) {
        self.update(
            status.last_round,
            status.catchup_time,
            status.catchpoint_acquired_blocks,
            status.upgrade_node_vote,
        );
    }

    /// Force the next [`NodeStatus::fetch`] to look up the version again
    pub fn reset_version(&mut self) {
        self.version = None;
    }

    /// Fetch status (and the version on first use) from the node
    ///
    /// The version and network are cached as soon as `/versions` answers. A
    /// failed release lookup is returned after the status has been applied,
    /// and is not retried until [`NodeStatus::reset_version`].
    pub async fn fetch(
        &mut self,
        client: &dyn NodeClient,
        releases: &dyn ReleaseFeed,
    ) -> Result<(), WatchError> {
        let mut release_error = None;
        if self.version.is_none() {
            let info = client.get_version().await?;
            let version = format_version(&info.build);
            self.network = info.genesis_id;
            self.version = Some(version.clone());

            match releases.latest_release(&info.build.channel).await {
                Ok(latest) => {
                    self.needs_update = latest.as_deref().is_some_and(|l| l != version);
                    if self.needs_update {
                        log::info!(
                            "Node runs {} but {} is the latest {} release",
                            version,
                            latest.as_deref().unwrap_or_default(),
                            info.build.channel
                        );
                    }
                }
                Err(e) => {
                    log::warn!("Release lookup for {} failed: {}", info.build.channel, e);
                    release_error = Some(e);
                }
            }
        }

        let status = client.get_status().await?;
        self.apply(&status);

        match release_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Format a build as `v{major}.{minor}.{build}-{channel}`
pub fn format_version(build: &BuildVersion) -> String {
    format!(
        "v{}.{}.{}-{}",
        build.major, build.minor, build.build_number, build.channel
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{status, version, MockNode, StaticReleases};

    #[test]
    fn test_update_transitions() {
        let mut node = NodeStatus::default();
        assert_eq!(node.state, LifecycleState::Unknown);

        node.update(10, 5_000, Some(12), None);
        assert_eq!(node.state, LifecycleState::FastCatchup);

        node.update(11, 5_000, None, None);
        assert_eq!(node.state, LifecycleState::Syncing);

        node.update(12, 0, None, None);
        assert_eq!(node.state, LifecycleState::Stable);
        assert_eq!(node.last_round, 12);

        // Acquired blocks without catchup time is still stable
        node.state = LifecycleState::FastCatchup;
        node.update(13, 0, Some(1), None);
        assert_eq!(node.state, LifecycleState::Stable);
    }

    #[test]
    fn test_update_vote() {
        let mut node = NodeStatus::default();
        node.update(1, 0, None, Some(true));
        assert!(node.voting);
        node.update(2, 0, None, None);
        assert!(node.voting);
        node.update(3, 0, None, Some(false));
        assert!(!node.voting);
    }

    #[test]
    fn test_format_version() {
        assert_eq!(format_version(&version("beta").build), "v3.26.0-beta");
        assert_eq!(LifecycleState::FastCatchup.to_string(), "FAST-CATCHUP");
    }

    #[tokio::test]
    async fn test_fetch_caches_version() {
        let client = MockNode::new();
        let releases = StaticReleases::new(Ok(Some("v3.26.0-stable".to_string())));
        let mut node = NodeStatus::default();

        node.fetch(&client, &releases).await.unwrap();
        assert_eq!(node.version.as_deref(), Some("v3.26.0-stable"));
        assert_eq!(node.network, "testnet-v1.0");
        assert!(!node.needs_update);
        assert_eq!(node.state, LifecycleState::Stable);
        assert_eq!(node.last_round, 1000);

        node.fetch(&client, &releases).await.unwrap();
        assert_eq!(client.count("get_version"), 1);
        assert_eq!(client.count("get_status"), 2);
        assert_eq!(releases.calls(), 1);

        node.reset_version();
        node.fetch(&client, &releases).await.unwrap();
        assert_eq!(client.count("get_version"), 2);
    }

    #[tokio::test]
    async fn test_fetch_needs_update() {
        let client = MockNode::new();
        let releases = StaticReleases::new(Ok(Some("v3.27.0-stable".to_string())));
        let mut node = NodeStatus::default();
        node.fetch(&client, &releases).await.unwrap();
        assert!(node.needs_update);

        let releases = StaticReleases::new(Ok(None));
        node.reset_version();
        node.fetch(&client, &releases).await.unwrap();
        assert!(!node.needs_update);
    }

    #[tokio::test]
    async fn test_fetch_errors() {
        let client = MockNode::new();
        client.statuses.set(Err(WatchError::RemoteStatus {
            code: 500,
            message: "internal".to_string(),
        }));
        let releases = StaticReleases::new(Ok(None));
        let mut node = NodeStatus::default();

        let err = node.fetch(&client, &releases).await.unwrap_err();
        assert_eq!(
            err,
            WatchError::RemoteStatus {
                code: 500,
                message: "internal".to_string()
            }
        );

    }

    #[tokio::test]
    async fn test_release_failure_still_applies_status() {
        let client = MockNode::new();
        client.statuses.set(Ok(status(4000, 1_000, Some(10))));
        let releases = StaticReleases::new(Err(WatchError::Transport("offline".to_string())));
        let mut node = NodeStatus::default();

        let err = node.fetch(&client, &releases).await.unwrap_err();
        assert!(matches!(err, WatchError::Transport(_)));
        assert_eq!(node.version.as_deref(), Some("v3.26.0-stable"));
        assert_eq!(node.network, "testnet-v1.0");
        assert!(!node.needs_update);
        assert_eq!(node.state, LifecycleState::FastCatchup);
        assert_eq!(node.last_round, 4000);
        assert_eq!(client.count("get_status"), 1);

        // Version is cached; the feed is not asked again
        client.statuses.set(Ok(status(4100, 0, None)));
        node.fetch(&client, &releases).await.unwrap();
        assert_eq!(node.state, LifecycleState::Stable);
        assert_eq!(client.count("get_version"), 1);
        assert_eq!(releases.calls(), 1);
    }

    #[test]
    fn test_apply_response() {
        let mut node = NodeStatus::default();
        node.apply(&status(77, 9, Some(3)));
        assert_eq!(node.state, LifecycleState::FastCatchup);
        assert_eq!(node.last_round, 77);
    }
}
