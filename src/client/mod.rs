//! Primary-context client.
//!
//! [`QuantizeClient`] owns the worker lifecycle and turns each call into a
//! correlated request:
//!
//! ```text
//! call ──► wait for Ready ──► register(id, timeout) ──► post Request{id}
//!                                                          │
//!            settle(id) ◄── Response{id} ◄── worker ◄──────┘
//! ```
//!
//! Responses are matched by id only; arrival order does not matter. Responses
//! whose id is no longer pending (timed out, disposed) are dropped.

mod error;
mod proxy;

pub use error::{ClientError, ClientResult};
pub use proxy::{
    ClientConfig, QuantizeClient, DEFAULT_INIT_TIMEOUT_MS, DEFAULT_OPERATION_TIMEOUT_MS,
};
