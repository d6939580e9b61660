//! Node watching module
//!
//! This module keeps a live picture of a single algod node: lifecycle
//! state, version freshness, round pace, network throughput and the
//! participation keys it holds.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    node module                           │
//! ├─────────────────────────────────────────────────────────┤
//! │  watch.rs         - Polling loop and callback            │
//! │  state.rs         - Aggregate snapshot and stop handle   │
//! │  status.rs        - Lifecycle state and version check    │
//! │  metrics.rs       - Round time, TPS, RX/TX rates         │
//! │  participation.rs - Participation key management         │
//! │  accounts.rs      - Account views from keys              │
//! │  releases.rs      - go-algorand release lookup           │
//! │  rpc.rs           - algod REST client                    │
//! │  config.rs        - Configuration types and persistence  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod accounts;
pub mod config;
pub mod metrics;
pub mod participation;
pub mod releases;
pub mod rpc;
pub mod state;
pub mod status;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use accounts::{Account, AccountSource, Clock, NodeAccounts, SystemClock};
pub use config::{WatchConfig, WatchSettings};
pub use metrics::MetricsSnapshot;
pub use participation::{GenerateKeyParams, ParticipationKey};
pub use releases::{GitHubReleaseFeed, ReleaseFeed};
pub use rpc::{AlgodClient, NodeClient};
pub use state::{AggregateState, WatchHandle, WatchPhase};
pub use status::{LifecycleState, NodeStatus};
pub use watch::{StateWatcher, WatchCallback};
