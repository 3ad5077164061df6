//! # Quantbridge
//!
//! Offloads image quantization to an isolated worker context and correlates
//! the replies back to their callers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              QuantizeClient (primary context)            │
//! │  - owns worker lifecycle and the deferred registry       │
//! │  - every call: id → register → Request → await           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [transport: thread channel or NDJSON stdio]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Dispatcher (worker context)                 │
//! │  - posts Ready on start, applies Configure               │
//! │  - lazily loads the engine on the first Request          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engine adapter]
//! ┌─────────────────────────────────────────────────────────┐
//! │       QuantizationEngine (imagequant + png codec)        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod registry;
pub mod telemetry;
pub mod timer;
pub mod transport;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::client::{ClientConfig, ClientError, ClientResult, QuantizeClient};
    pub use crate::protocol::{Action, QualityRange, QuantizeOptions, QuantizeResult};
}

pub use client::{ClientConfig, ClientError, ClientResult, QuantizeClient};
pub use protocol::{QuantizeOptions, QuantizeResult};
