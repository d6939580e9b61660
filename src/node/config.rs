//! Watcher configuration types and persistence
//!
//! Handles loading and saving the watcher configuration from disk and
//! discovering the algod endpoint and API token from a node data directory.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at the algod data directory
pub const ALGORAND_DATA_ENV: &str = "ALGORAND_DATA";

/// Endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";

/// GitHub releases API for go-algorand
pub const DEFAULT_RELEASE_FEED_URL: &str =
    "https://api.github.com/repos/algorand/go-algorand/releases";

/// Watch loop pacing derived from [`WatchConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    /// Rounds averaged for round time / TPS
    pub window: u64,
    /// Sleep after a failed round wait or metrics fetch
    pub error_backoff: Duration,
    /// Sleep between status polls while the node is fast-catching up
    pub catchup_interval: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            window: default_metrics_window(),
            error_backoff: Duration::from_secs(default_error_backoff_secs()),
            catchup_interval: Duration::from_secs(default_catchup_interval_secs()),
        }
    }
}

/// Watcher configuration stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// algod REST endpoint (empty means discover from the data directory)
    #[serde(default)]
    pub endpoint: String,

    /// API token (admin token enables participation key management)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// algod data directory (falls back to $ALGORAND_DATA)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<String>,

    /// Rounds averaged for round time / TPS
    #[serde(default = "default_metrics_window")]
    pub metrics_window: u64,

    /// Seconds to wait after a failed fetch
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Seconds between status polls during fast catchup
    #[serde(default = "default_catchup_interval_secs")]
    pub catchup_interval_secs: u64,

    /// Release listing used for the version freshness check
    #[serde(default = "default_release_feed_url")]
    pub release_feed_url: String,

    /// Log level name (error, warn, info, debug, trace)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_metrics_window() -> u64 {
    100
}

fn default_error_backoff_secs() -> u64 {
    3
}

fn default_catchup_interval_secs() -> u64 {
    10
}

fn default_release_feed_url() -> String {
    DEFAULT_RELEASE_FEED_URL.to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: None,
            data_directory: None,
            metrics_window: default_metrics_window(),
            error_backoff_secs: default_error_backoff_secs(),
            catchup_interval_secs: default_catchup_interval_secs(),
            release_feed_url: default_release_feed_url(),
            log_level: None,
        }
    }
}

impl WatchConfig {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("algorun-watch")
            .join("config.json")
    }

    /// Load config from the default location, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return default if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded watcher config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::error!("Failed to parse config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config {}", path.display()))?;

        log::info!("Watcher config saved to {}", path.display());
        Ok(())
    }

    /// Get the algod data directory (explicit setting, then $ALGORAND_DATA)
    pub fn get_data_directory(&self) -> Option<PathBuf> {
        match &self.data_directory {
            Some(dir) if !dir.is_empty() => Some(PathBuf::from(crate::expand_path(dir))),
            _ => std::env::var(ALGORAND_DATA_ENV)
                .ok()
                .filter(|d| !d.is_empty())
                .map(|d| PathBuf::from(crate::expand_path(&d))),
        }
    }

    /// Get the effective endpoint (explicit, then algod.net, then default)
    pub fn effective_endpoint(&self) -> String {
        if !self.endpoint.is_empty() {
            return self.endpoint.clone();
        }

        self.get_data_directory()
            .and_then(|dir| read_trimmed(&dir.join("algod.net")))
            .map(|net| {
                if net.starts_with("http://") || net.starts_with("https://") {
                    net
                } else {
                    format!("http://{}", net)
                }
            })
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// Get the effective API token (explicit, then admin token, then plain token)
    pub fn effective_token(&self) -> Option<String> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }

        let dir = self.get_data_directory()?;
        read_trimmed(&dir.join("algod.admin.token")).or_else(|| read_trimmed(&dir.join("algod.token")))
    }

    /// Loop pacing for the watcher
    pub fn settings(&self) -> WatchSettings {
        WatchSettings {
            window: if self.metrics_window == 0 {
                default_metrics_window()
            } else {
                self.metrics_window
            },
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            catchup_interval: Duration::from_secs(self.catchup_interval_secs),
        }
    }
}

/// Read a small text file, returning `None` when missing or empty
fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
