//! Worker context.
//!
//! Everything that runs on the far side of the boundary: the per-worker
//! [`WorkerSession`] with its lazily loaded engine, and the [`Dispatcher`]
//! that turns inbound messages into correlated responses.
//!
//! # Lifecycle
//!
//! ```text
//! start ──► post Ready ──► Configure? ──► first Request ──► load engine (once)
//!                                               │
//!                                               ▼
//!                            handle ──► Response{id, success, result | error}
//! ```
//!
//! Ready means "loop running", not "engine loaded". The engine is loaded on
//! the first Request, after any Configure that preceded it on the channel.

mod dispatcher;
mod error;
mod handlers;
mod session;

pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use session::WorkerSession;
