//! Remote API error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The call never completed (network, timeout, dispatch failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Request rate exceeded; safe to retry later.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Resource already exists or is in a state that forbids the call.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Request rejected as invalid (e.g. upload frequency incompatible with
    /// the model's sampling rate).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("service error: {0}")]
    Service(String),
}

impl RemoteError {
    /// Whether a polling loop may retry at its normal cadence.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::Throttled(_))
    }
}
