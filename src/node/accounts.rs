//! Account views derived from participation keys

use super::participation::ParticipationKey;
use super::rpc::NodeClient;
use super::state::AggregateState;
use crate::error::WatchError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Round time assumed before one has been measured
pub const DEFAULT_ROUND_TIME: Duration = Duration::from_millis(2800);

/// Wall clock source
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// [`Clock`] backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// An account with participation keys on the node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    /// Consensus status ("Online", "Offline", ...)
    pub status: String,
    /// Balance in microAlgos
    pub balance: u64,
    pub incentive_eligible: bool,
    /// Number of keys registered for this address
    pub keys: usize,
    /// Estimated expiry of the longest-lived key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_vote: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_proposal: Option<u64>,
}

/// Builds account views for the watcher
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn derive_accounts(
        &self,
        state: &AggregateState,
        clock: &dyn Clock,
        client: &dyn NodeClient,
    ) -> Result<HashMap<String, Account>, WatchError>;
}

/// Derives accounts by looking up every key's address on the node
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeAccounts;

#[async_trait]
impl AccountSource for NodeAccounts {
    async fn derive_accounts(
        &self,
        state: &AggregateState,
        clock: &dyn Clock,
        client: &dyn NodeClient,
    ) -> Result<HashMap<String, Account>, WatchError> {
        let round_time = if state.metrics.round_time.is_zero() {
            DEFAULT_ROUND_TIME
        } else {
            state.metrics.round_time
        };

        let mut accounts: HashMap<String, Account> = HashMap::new();
        for key in &state.participation_keys {
            if !accounts.contains_key(&key.address) {
                let info = client.get_account(&key.address).await?;
                accounts.insert(
                    key.address.clone(),
                    Account {
                        address: key.address.clone(),
                        status: info.status,
                        balance: info.amount,
                        incentive_eligible: info.incentive_eligible,
                        keys: 0,
                        expires: None,
                        last_vote: None,
                        last_proposal: None,
                    },
                );
            }

            let Some(account) = accounts.get_mut(&key.address) else {
                continue;
            };
            account.keys += 1;
            account.expires = account
                .expires
                .max(expires_at(clock, key, state.status.last_round, round_time));
            account.last_vote = account.last_vote.max(key.last_vote);
            account.last_proposal = account.last_proposal.max(key.last_block_proposal);
        }

        Ok(accounts)
    }
}

/// Estimated wall time at which `key` stops being valid
///
/// `None` once the key's last valid round has passed.
pub fn expires_at(
    clock: &dyn Clock,
    key: &ParticipationKey,
    last_round: u64,
    round_time: Duration,
) -> Option<SystemTime> {
    let last_valid = key.effective_last_valid.unwrap_or(key.key.vote_last_valid);
    if last_valid <= last_round {
        return None;
    }

    let rounds_left = u32::try_from(last_valid - last_round).unwrap_or(u32::MAX);
    clock.now().checked_add(round_time.saturating_mul(rounds_left))
}
