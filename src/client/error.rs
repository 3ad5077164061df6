//! Client-side error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced to callers of [`QuantizeClient`](super::QuantizeClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// The worker failed to spawn, or the ready handshake did not complete in
    /// time. A new client is required to retry.
    #[error("worker initialization failed: {0}")]
    Initialization(String),

    /// No response arrived for this call within the operation timeout.
    #[error("operation {id} timed out after {timeout_ms} ms")]
    OperationTimeout {
        /// Correlation id of the abandoned call.
        id: u64,
        /// Timeout that expired.
        timeout_ms: u64,
    },

    /// The worker reported a failure. Only its message crosses the boundary.
    #[error("worker error: {0}")]
    Operation(String),

    /// The client was disposed before or while the call was outstanding.
    #[error("client has been disposed")]
    Disposed,

    /// The worker context went away after becoming ready.
    #[error("worker exited: {0}")]
    WorkerExited(String),

    /// Posting to the worker failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failed to serialize request data.
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to deserialize a result.
    #[error("failed to deserialize result: {0}")]
    DeserializeFailed(#[source] serde_json::Error),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::OperationTimeout { .. })
    }

    pub fn is_initialization(&self) -> bool {
        matches!(self, Self::Initialization(_))
    }

    /// Check if this error indicates the worker is gone for good.
    pub fn is_worker_exited(&self) -> bool {
        matches!(self, Self::WorkerExited(_) | Self::Transport(_))
    }

    /// Message reported by the worker, if this is an operation failure.
    pub fn operation_message(&self) -> Option<&str> {
        match self {
            Self::Operation(message) => Some(message),
            _ => None,
        }
    }
}
