//! Error types for the node watcher
//!
//! Every fetch-layer failure is folded into [`WatchError`]. The watch loop
//! never treats one as fatal; it reports it through the callback and retries.

use thiserror::Error;

/// Errors produced while talking to algod or the release feed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// Network or connection failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("status code {code}: {message}")]
    RemoteStatus { code: u16, message: String },

    /// The API token lacks the admin scope
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Bad caller-supplied parameter
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown resource (e.g. participation key id)
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl WatchError {
    /// Map a non-success HTTP status into the matching variant
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            401 | 403 => WatchError::Unauthorized(message),
            404 => WatchError::NotFound(message),
            _ => WatchError::RemoteStatus { code, message },
        }
    }
}

impl From<reqwest::Error> for WatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            WatchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            WatchError::from_status(status.as_u16(), e.to_string())
        } else {
            WatchError::Transport(e.to_string())
        }
    }
}

impl From<url::ParseError> for WatchError {
    fn from(e: url::ParseError) -> Self {
        WatchError::InvalidArgument(format!("invalid url: {}", e))
    }
}
