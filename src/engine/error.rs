//! Engine error types.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the quantization engine or its codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine module could not be loaded.
    #[error("failed to load engine from {url}: {reason}")]
    Load { url: String, reason: String },

    /// Encoded image bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// Palette and indices could not be encoded.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// Pixel buffer or dimensions are inconsistent.
    #[error("invalid image input: {0}")]
    InvalidInput(String),

    /// An option setter rejected its value.
    #[error("failed to set {option}: {reason}")]
    InvalidOption { option: &'static str, reason: String },

    /// Quantization or remapping failed.
    #[error("quantization failed: {0}")]
    Quantize(String),
}

impl EngineError {
    pub fn load(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn option(option: &'static str, reason: impl std::fmt::Debug) -> Self {
        Self::InvalidOption {
            option,
            reason: format!("{:?}", reason),
        }
    }
}
