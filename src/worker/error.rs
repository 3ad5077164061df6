//! Worker-side error types.
//!
//! Only the rendered message of these errors crosses the context boundary.

use thiserror::Error;

use crate::engine::EngineError;

/// Errors raised while handling a single request.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The action tag is not one the worker understands.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The request payload does not match the action.
    #[error("invalid request data for {action}: {source}")]
    InvalidData {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A supplied option is out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The engine failed to load or to process the image.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The result could not be serialized.
    #[error("failed to serialize result: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// A handler panicked.
    #[error("worker handler panicked: {0}")]
    Panicked(String),
}
