//! Round time, TPS and network throughput tracking
//!
//! Round time and TPS come from block headers over a window of rounds.
//! RX/TX rates are deltas between two samples of algod's Prometheus
//! byte counters.

use super::rpc::NodeClient;
use crate::error::WatchError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Rounds averaged when no window is configured
pub const DEFAULT_WINDOW: u64 = 100;

/// Round metrics are refreshed on rounds divisible by this
pub const REFRESH_EVERY_ROUNDS: u64 = 5;

/// Past this round a zero round time triggers an off-cadence refresh
pub const CATCH_UP_ROUND: u64 = 100;

pub const SENT_BYTES_COUNTER: &str = "algod_network_sent_bytes_total";
pub const RECEIVED_BYTES_COUNTER: &str = "algod_network_received_bytes_total";

/// Header fields of a block needed for round metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(rename = "rnd", default)]
    pub round: u64,
    /// Unix timestamp in seconds
    #[serde(default)]
    pub ts: i64,
    /// Cumulative transaction counter
    #[serde(default)]
    pub tc: u64,
}

/// Averages over a window of rounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockMetrics {
    pub avg_round_time: Duration,
    pub tps: f64,
}

impl BlockMetrics {
    /// Compute averages between two block headers
    pub fn between(newer: &BlockHeader, older: &BlockHeader) -> Self {
        let rounds = newer.round.saturating_sub(older.round);
        let elapsed_secs = newer.ts - older.ts;
        if rounds == 0 || elapsed_secs <= 0 {
            return Self::default();
        }

        let elapsed = Duration::from_secs(elapsed_secs as u64);
        let txns = newer.tc.saturating_sub(older.tc);
        // rounds > 0 here, so the divisor never reaches zero
        let divisor = u32::try_from(rounds).unwrap_or(u32::MAX);

        Self {
            avg_round_time: elapsed / divisor,
            tps: txns as f64 / elapsed.as_secs_f64(),
        }
    }
}

/// Derived node metrics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Rounds averaged for round time / TPS
    pub window: u64,
    pub round_time: Duration,
    pub tps: f64,
    /// Received bytes per second
    pub rx: u64,
    /// Sent bytes per second
    pub tx: u64,
    #[serde(skip)]
    pub last_sample: Option<Instant>,
    pub last_rx: u64,
    pub last_tx: u64,
    /// False while `/metrics` is unreachable; rates are then stale
    pub enabled: bool,
}

impl MetricsSnapshot {
    /// Window in use, falling back to [`DEFAULT_WINDOW`]
    pub fn effective_window(&self) -> u64 {
        if self.window == 0 {
            DEFAULT_WINDOW
        } else {
            self.window
        }
    }

    /// Whether round metrics should be recomputed at `round`
    pub fn should_refresh(&self, round: u64) -> bool {
        round % REFRESH_EVERY_ROUNDS == 0 || (round > CATCH_UP_ROUND && self.round_time.is_zero())
    }

    pub fn apply_block_metrics(&mut self, metrics: &BlockMetrics) {
        self.round_time = metrics.avg_round_time;
        self.tps = metrics.tps;
    }

    /// Update RX/TX rates from a counter sample taken at `now`
    ///
    /// The first sample only primes the counters. Missing counters count as
    /// a decode failure and leave the previous rates untouched.
    pub fn apply_counters(
        &mut self,
        counters: &HashMap<String, u64>,
        now: Instant,
    ) -> Result<(), WatchError> {
        let (Some(&sent), Some(&received)) = (
            counters.get(SENT_BYTES_COUNTER),
            counters.get(RECEIVED_BYTES_COUNTER),
        ) else {
            self.enabled = false;
            return Err(WatchError::Decode(format!(
                "metrics missing {} or {}",
                SENT_BYTES_COUNTER, RECEIVED_BYTES_COUNTER
            )));
        };

        if let Some(last) = self.last_sample {
            let elapsed = now.saturating_duration_since(last);
            self.tx = byte_rate(self.last_tx, sent, elapsed);
            self.rx = byte_rate(self.last_rx, received, elapsed);
        }

        self.enabled = true;
        self.last_sample = Some(now);
        self.last_tx = sent;
        self.last_rx = received;
        Ok(())
    }

    /// Mark `/metrics` as unreachable, keeping the last rates
    pub fn mark_unavailable(&mut self) {
        self.enabled = false;
    }

    /// Fetch `/metrics` and update RX/TX; failures only disable the metrics
    pub async fn update_from_rpc(&mut self, client: &dyn NodeClient, now: Instant) {
        let result = match client.get_network_metrics().await {
            Ok(counters) => self.apply_counters(&counters, now),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if self.enabled {
                log::warn!("Network metrics unavailable: {}", e);
            }
            self.mark_unavailable();
        }
    }
}

/// Bytes per second between two counter values, clamped at zero
///
/// A counter that went backwards (node restart) yields zero.
pub fn byte_rate(previous: u64, current: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if current < previous || secs <= 0.0 {
        return 0;
    }
    ((current - previous) as f64 / secs) as u64
}

/// Parse Prometheus text exposition into `name -> value`
///
/// Labelled series keep their labels as part of the name.
pub fn parse_prometheus(body: &str) -> HashMap<String, u64> {
    let mut counters = HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, rest) = match line.rfind('}') {
            Some(end) => line.split_at(end + 1),
            None => match line.split_once(char::is_whitespace) {
                Some(pair) => pair,
                None => continue,
            },
        };

        let Some(value) = rest.split_whitespace().next() else {
            continue;
        };
        if let Ok(value) = value.parse::<f64>() {
            if value.is_finite() && value >= 0.0 {
                counters.insert(name.to_string(), value as u64);
            }
        }
    }
    counters
}
