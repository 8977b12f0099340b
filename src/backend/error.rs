//! Backend error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend call failure with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::TimedOut, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Auth, message)
    }

    pub fn session_not_active(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::SessionNotActive, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Rejected, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Decode, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidRequest, message)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timed_out(format!("Request timed out: {e}"))
        } else if e.is_decode() {
            Self::decode(format!("Malformed response: {e}"))
        } else if e.is_builder() {
            Self::invalid_request(e.to_string())
        } else {
            Self::network(format!("Network error: {e}"))
        }
    }
}

/// Error classification for display and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Connection refused, reset, DNS failure
    Network,
    /// Transport-level request timeout
    TimedOut,
    /// Token missing, expired or rejected (401, 403)
    Auth,
    /// The backend has no active chat-support session for the phone number
    SessionNotActive,
    /// Non-success status discriminator or HTTP status
    Rejected,
    /// Response body could not be understood
    Decode,
    /// Request could not be built (bad base URL)
    InvalidRequest,
}

impl BackendErrorKind {
    /// Whether the next scheduled poll may succeed without operator action
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::TimedOut | Self::Rejected)
    }
}

/// Phrases the backend uses when a chat-support session is missing
const SESSION_NOT_ACTIVE_PHRASES: [&str; 4] = [
    "chat support is not active",
    "chat support session is not active",
    "no active chat support",
    "no active chat-support",
];

/// Map a refused request to its kind, separating "session not active"
/// rejections from everything else.
pub(crate) fn classify_rejection(status: u16, message: String) -> BackendError {
    let lowered = message.to_lowercase();
    if status == 409
        || SESSION_NOT_ACTIVE_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase))
    {
        BackendError::session_not_active(message)
    } else if status == 401 || status == 403 {
        BackendError::auth(message)
    } else {
        BackendError::rejected(message)
    }
}
