//! Participation key management
//!
//! Lists, reads, generates and deletes participation keys on the node, and
//! maintains the local working set the watcher exposes.

use super::rpc::NodeClient;
use crate::error::WatchError;
use serde::{Deserialize, Serialize};

/// Key material of a participation key (base64 public keys)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeyMaterial {
    pub vote_first_valid: u64,
    pub vote_last_valid: u64,
    pub vote_key_dilution: u64,
    #[serde(default)]
    pub selection_participation_key: String,
    #[serde(default)]
    pub vote_participation_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_proof_key: Option<String>,
}

/// A participation key registered with the node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParticipationKey {
    pub id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_first_valid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_last_valid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vote: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_proposal: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state_proof: Option<u64>,
    #[serde(default)]
    pub key: KeyMaterial,
}

impl ParticipationKey {
    /// Whether the key has not been listed by the node yet
    pub fn is_pending(&self) -> bool {
        self.id.is_empty()
    }
}

/// Parameters for key generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateKeyParams {
    /// First round the keys are valid for
    pub first: u64,
    /// Last round the keys are valid for
    pub last: u64,
    /// Key dilution; the node picks a default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilution: Option<u64>,
}

/// List all keys on the node
///
/// Fails with `Unauthorized` on any non-success response, since only admin
/// tokens may list keys.
pub async fn list_keys(client: &dyn NodeClient) -> Result<Vec<ParticipationKey>, WatchError> {
    client.list_participation_keys().await.map_err(|e| match e {
        WatchError::RemoteStatus { code, message } => {
            WatchError::Unauthorized(format!("status code {}: {}", code, message))
        }
        other => other,
    })
}

/// Read a single key by id
pub async fn read_key(client: &dyn NodeClient, id: &str) -> Result<ParticipationKey, WatchError> {
    if id.is_empty() {
        return Err(WatchError::InvalidArgument("key id is empty".to_string()));
    }
    client.get_participation_key(id).await
}

/// Request key generation for `address`
///
/// Generation runs asynchronously on the node. Returns the key as listed
/// right after the request when the node already reports it, otherwise a
/// pending record (empty id) carrying the requested range.
pub async fn generate_key_pair(
    client: &dyn NodeClient,
    address: &str,
    params: &GenerateKeyParams,
) -> Result<ParticipationKey, WatchError> {
    if address.is_empty() {
        return Err(WatchError::InvalidArgument("address is empty".to_string()));
    }
    if params.last < params.first {
        return Err(WatchError::InvalidArgument(format!(
            "last round {} precedes first round {}",
            params.last, params.first
        )));
    }

    client.generate_participation_key(address, params).await?;
    log::info!(
        "Requested participation key for {} (rounds {}..={})",
        address,
        params.first,
        params.last
    );

    let listed = match list_keys(client).await {
        Ok(keys) => keys.into_iter().find(|k| {
            k.address == address
                && k.key.vote_first_valid == params.first
                && k.key.vote_last_valid == params.last
        }),
        Err(e) => {
            log::debug!("Could not list keys after generation request: {}", e);
            None
        }
    };

    Ok(listed.unwrap_or_else(|| ParticipationKey {
        address: address.to_string(),
        key: KeyMaterial {
            vote_first_valid: params.first,
            vote_last_valid: params.last,
            vote_key_dilution: params.dilution.unwrap_or_default(),
            ..Default::default()
        },
        ..Default::default()
    }))
}

/// Delete a key on the node
pub async fn delete_key(client: &dyn NodeClient, id: &str) -> Result<(), WatchError> {
    if id.is_empty() {
        return Err(WatchError::InvalidArgument("key id is empty".to_string()));
    }
    client.delete_participation_key(id).await?;
    log::info!("Deleted participation key {}", id);
    Ok(())
}

/// Delete a key on the node, then drop it from `keys`
///
/// `keys` is left untouched when the remote delete fails.
pub async fn delete_and_forget(
    client: &dyn NodeClient,
    keys: &mut Vec<ParticipationKey>,
    id: &str,
) -> Result<(), WatchError> {
    delete_key(client, id).await?;
    remove_by_id(keys, id);
    Ok(())
}

/// Remove the first key with `id`, preserving order; no-op when absent
pub fn remove_by_id(keys: &mut Vec<ParticipationKey>, id: &str) {
    if let Some(pos) = keys.iter().position(|k| k.id == id) {
        keys.remove(pos);
    }
}
