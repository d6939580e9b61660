//! The watch loop
//!
//! Long-polls algod for each new round, reconciles status, keys, accounts
//! and metrics, and hands every fresh snapshot (or error) to a callback.
//!
//! ## Cycle
//!
//! ```text
//! ┌──────────────┐  fast catchup   ┌─────────────────────────────┐
//! │ stop check   ├────────────────►│ sleep 10s, re-fetch status  │
//! └──────┬───────┘                 └─────────────────────────────┘
//!        │ otherwise
//!        ▼
//! wait-for-block(last round) ──error──► report, sleep 3s, retry
//!        │
//!        ▼
//! status update → keys/accounts → metrics (every 5th round,
//! not while syncing) → advance round → callback
//! ```

use super::accounts::{AccountSource, Clock, NodeAccounts, SystemClock};
use super::config::WatchSettings;
use super::participation;
use super::releases::ReleaseFeed;
use super::rpc::NodeClient;
use super::state::{AggregateState, WatchHandle};
use super::status::LifecycleState;
use crate::error::WatchError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// Receives watcher output on the loop's task
///
/// A slow callback directly slows down polling.
pub trait WatchCallback: Send {
    /// A new snapshot is available
    fn on_state(&mut self, state: &AggregateState);

    /// A fetch failed; the previous snapshot is still current
    fn on_error(&mut self, error: &WatchError);
}

impl<F> WatchCallback for F
where
    F: FnMut(Result<&AggregateState, &WatchError>) + Send,
{
    fn on_state(&mut self, state: &AggregateState) {
        self(Ok(state))
    }

    fn on_error(&mut self, error: &WatchError) {
        self(Err(error))
    }
}

/// Owns the aggregate state and drives the polling cycle
pub struct StateWatcher {
    state: AggregateState,
    client: Arc<dyn NodeClient>,
    releases: Arc<dyn ReleaseFeed>,
    accounts: Arc<dyn AccountSource>,
    clock: Arc<dyn Clock>,
    settings: WatchSettings,
}

impl StateWatcher {
    /// Create a watcher using [`NodeAccounts`] and the system clock
    pub fn new(
        client: Arc<dyn NodeClient>,
        releases: Arc<dyn ReleaseFeed>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            state: AggregateState::default(),
            client,
            releases,
            accounts: Arc::new(NodeAccounts),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Replace the account derivation
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountSource>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Replace the wall clock used for key expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    /// The client the watcher polls, for key management calls
    pub fn client(&self) -> Arc<dyn NodeClient> {
        self.client.clone()
    }

    /// Run the loop on a dedicated task
    ///
    /// The join handle yields the watcher back once stopped.
    pub fn spawn<C>(mut self, callback: C) -> (WatchHandle, JoinHandle<StateWatcher>)
    where
        C: WatchCallback + 'static,
    {
        let handle = WatchHandle::new();
        let loop_handle = handle.clone();
        let task = tokio::spawn(async move {
            self.watch(&loop_handle, callback).await;
            self
        });
        (handle, task)
    }

    /// Watch until `handle` is stopped
    ///
    /// Errors never end the loop; they are reported and retried.
    pub async fn watch<C: WatchCallback>(&mut self, handle: &WatchHandle, mut callback: C) {
        if !handle.begin() {
            log::warn!("Watch handle already used or stopped; not watching");
            return;
        }

        self.state.watching = true;
        if self.state.metrics.window == 0 {
            self.state.metrics.window = self.settings.window;
        }

        log::info!("Watching node (window {} rounds)", self.state.metrics.window);

        if let Err(e) = self.fetch_status().await {
            log::warn!("Initial status fetch failed: {}", e);
            callback.on_error(&e);
        }

        let mut last_round = self.state.status.last_round;

        while !handle.is_stopped() {
            if self.state.status.state == LifecycleState::FastCatchup {
                sleep(self.settings.catchup_interval).await;
                let result = self.fetch_status().await;
                last_round = self.state.status.last_round;
                match result {
                    Ok(()) => callback.on_state(&self.state),
                    Err(e) => {
                        log::warn!("Status fetch during fast catchup failed: {}", e);
                        callback.on_error(&e);
                    }
                }
                continue;
            }

            let status = match self.client.wait_for_block(last_round).await {
                Ok(status) => status,
                Err(e) => {
                    self.report_and_wait(&e, &mut callback).await;
                    continue;
                }
            };

            self.state.status.apply(&status);
            log::debug!(
                "Round {} ({})",
                self.state.status.last_round,
                self.state.status.state
            );

            self.update_keys().await;

            // Round numbers during sync say nothing about the network pace
            if self.state.status.state != LifecycleState::Syncing
                && self.state.metrics.should_refresh(self.state.status.last_round)
            {
                if let Err(e) = self.update_metrics().await {
                    self.report_and_wait(&e, &mut callback).await;
                    continue;
                }
            }

            last_round = self.state.status.last_round;
            callback.on_state(&self.state);
        }

        self.state.watching = false;
        log::info!("Stopped watching at round {}", self.state.status.last_round);
    }

    async fn fetch_status(&mut self) -> Result<(), WatchError> {
        self.state
            .status
            .fetch(self.client.as_ref(), self.releases.as_ref())
            .await
    }

    async fn report_and_wait<C: WatchCallback>(&self, error: &WatchError, callback: &mut C) {
        log::warn!(
            "Node request failed, retrying in {:?}: {}",
            self.settings.error_backoff,
            error
        );
        callback.on_error(error);
        sleep(self.settings.error_backoff).await;
    }

    /// Refresh keys; success implies an admin token and refreshes accounts
    async fn update_keys(&mut self) {
        match participation::list_keys(self.client.as_ref()).await {
            Ok(keys) => {
                if !self.state.admin {
                    log::info!("Participation keys available ({} keys)", keys.len());
                }
                self.state.participation_keys = keys;
                self.state.admin = true;
                self.update_accounts().await;
            }
            Err(e) => {
                if self.state.admin {
                    log::info!("Participation keys unavailable: {}", e);
                }
                self.state.participation_keys.clear();
                self.state.admin = false;
            }
        }
    }

    async fn update_accounts(&mut self) {
        let result = self
            .accounts
            .derive_accounts(&self.state, self.clock.as_ref(), self.client.as_ref())
            .await;
        match result {
            Ok(accounts) => self.state.accounts = accounts,
            Err(e) => log::warn!("Failed to derive accounts: {}", e),
        }
    }

    async fn update_metrics(&mut self) -> Result<(), WatchError> {
        let metrics = self
            .client
            .get_block_metrics(
                self.state.status.last_round,
                self.state.metrics.effective_window(),
            )
            .await?;
        self.state.metrics.apply_block_metrics(&metrics);
        self.state
            .metrics
            .update_from_rpc(self.client.as_ref(), Instant::now())
            .await;
        Ok(())
    }
}
