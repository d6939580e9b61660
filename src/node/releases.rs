//! go-algorand release lookup
//!
//! Used by the status tracker to decide whether the node runs the latest
//! release of its channel.

use crate::error::WatchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Latest release tag per release channel
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// Newest release tag for `channel` (e.g. "v3.26.0-stable"), if any
    async fn latest_release(&self, channel: &str) -> Result<Option<String>, WatchError>;
}

/// GitHub API response for a release
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
}

/// Release feed backed by the GitHub releases API
pub struct GitHubReleaseFeed {
    client: Client,
    url: String,
}

impl GitHubReleaseFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, WatchError> {
        let client = Client::builder()
            .user_agent(concat!("algorun-watch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch all releases, newest first
    pub async fn fetch_releases(&self) -> Result<Vec<GitHubRelease>, WatchError> {
        log::debug!("Fetching releases from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| WatchError::Transport(format!("Failed to fetch releases: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::RemoteStatus {
                code: status.as_u16(),
                message: format!("GitHub API returned status {}", status),
            });
        }

        response
            .json()
            .await
            .map_err(|e| WatchError::Decode(format!("Failed to parse releases: {}", e)))
    }
}

#[async_trait]
impl ReleaseFeed for GitHubReleaseFeed {
    async fn latest_release(&self, channel: &str) -> Result<Option<String>, WatchError> {
        let releases = self.fetch_releases().await?;
        Ok(latest_for_channel(&releases, channel))
    }
}

/// Pick the newest non-draft tag of `channel` from a newest-first list
pub fn latest_for_channel(releases: &[GitHubRelease], channel: &str) -> Option<String> {
    let suffix = format!("-{}", channel.to_lowercase());
    releases
        .iter()
        .filter(|r| !r.draft)
        .find(|r| r.tag_name.to_lowercase().ends_with(&suffix))
        .map(|r| r.tag_name.clone())
}
