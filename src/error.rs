//! Error taxonomy shared by the origin and destination clients.
//!
//! Lookups that find nothing return `Ok(None)`; only genuine failures end up
//! here.

use thiserror::Error;

/// Errors raised while talking to either code host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// Missing or rejected credential, or an unauthenticated CLI.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Attempted to create something that already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// Network, HTTP status, output parsing or external process failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl MirrorError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Classify an HTTP status code and response body into a typed error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Auth(format!("HTTP {}: {}", status, body)),
            409 => Self::Conflict(format!("HTTP {}: {}", status, body)),
            _ => Self::Transport(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), &err.to_string()),
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("unexpected response payload: {}", err))
    }
}
