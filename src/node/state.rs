//! Aggregate watcher state and the stop handle
//!
//! [`AggregateState`] is owned by the watch loop; consumers only ever see it
//! borrowed for the duration of a callback.

use super::accounts::Account;
use super::metrics::MetricsSnapshot;
use super::participation::ParticipationKey;
use super::status::NodeStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Everything known about the watched node
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub status: NodeStatus,
    pub metrics: MetricsSnapshot,
    pub participation_keys: Vec<ParticipationKey>,
    pub accounts: HashMap<String, Account>,
    /// True while the last key listing succeeded (admin token in use)
    pub admin: bool,
    pub watching: bool,
}

/// Lifecycle of a watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Watching,
    Stopped,
}

impl WatchPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WatchPhase::Idle,
            1 => WatchPhase::Watching,
            _ => WatchPhase::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WatchPhase::Idle => 0,
            WatchPhase::Watching => 1,
            WatchPhase::Stopped => 2,
        }
    }
}

/// Cooperative stop handle for a watch loop
///
/// Cloning shares the same flag. `stop` may be called from any task; the
/// loop observes it at the next cycle boundary.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    phase: Arc<AtomicU8>,
}

impl Default for WatchHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchHandle {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(WatchPhase::Idle.as_u8())),
        }
    }

    pub fn phase(&self) -> WatchPhase {
        WatchPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Request the loop to stop after its current cycle
    pub fn stop(&self) {
        let previous = self.phase.swap(WatchPhase::Stopped.as_u8(), Ordering::SeqCst);
        if previous != WatchPhase::Stopped.as_u8() {
            log::debug!("Watch stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == WatchPhase::Stopped
    }

    /// Idle -> Watching; false if the handle was already used or stopped
    pub(crate) fn begin(&self) -> bool {
        self.phase
            .compare_exchange(
                WatchPhase::Idle.as_u8(),
                WatchPhase::Watching.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}
