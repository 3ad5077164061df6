//! Transport error types.

use std::io;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while moving messages across the context boundary.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to start the worker context.
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to write to the worker channel.
    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to read from the worker channel.
    #[error("failed to read from worker: {0}")]
    ReadFailed(#[source] io::Error),

    /// Failed to encode a message.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The other side of the channel is gone.
    #[error("worker channel closed")]
    Closed,
}
