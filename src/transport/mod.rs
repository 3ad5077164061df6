//! Worker transports.
//!
//! The client side spawns a worker through a [`WorkerSpawner`] and gets back a
//! [`WorkerLink`]: a [`WorkerPort`] to post messages and terminate the worker,
//! plus a stream of [`WorkerEvent`]s. The worker side serves a
//! [`WorkerEndpoint`]. Both sides see a single ordered channel.
//!
//! Two transports ship with the crate:
//!
//! - [`ThreadSpawner`]: worker runs on a dedicated OS thread with its own
//!   current-thread runtime; messages are moved through tokio channels.
//! - [`ProcessSpawner`]: worker runs as a child process
//!   (`quantbridge-worker`) speaking NDJSON over stdin/stdout, served on the
//!   worker side by [`StdioEndpoint`].

mod channel;
mod error;
mod process;
mod stdio;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{WorkerInbound, WorkerOutbound};

pub use channel::{channel_link, ChannelEndpoint, ThreadSpawner};
pub use error::{TransportError, TransportResult};
pub use process::ProcessSpawner;
pub use stdio::StdioEndpoint;

/// Something the worker context produced.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A protocol message.
    Message(WorkerOutbound),
    /// The worker context failed or went away.
    Failed(String),
}

/// Client-side handle for posting into a worker context.
pub trait WorkerPort: Send + Sync {
    fn post(&self, message: WorkerInbound) -> TransportResult<()>;

    /// Stop the worker immediately. In-flight work is abandoned.
    fn terminate(&self);
}

/// A freshly spawned worker context.
pub struct WorkerLink {
    pub port: Arc<dyn WorkerPort>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Creates worker contexts.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> TransportResult<WorkerLink>;
}

/// Worker-side view of the channel.
#[async_trait]
pub trait WorkerEndpoint: Send {
    /// Next inbound message, or `None` once the channel is closed.
    async fn recv(&mut self) -> Option<WorkerInbound>;

    async fn post(&mut self, message: WorkerOutbound) -> TransportResult<()>;
}
