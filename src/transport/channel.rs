//! In-process transport: worker on a dedicated thread.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineLoader, NativeEngineLoader};
use crate::protocol::{WorkerInbound, WorkerOutbound};
use crate::worker::Dispatcher;

use super::error::{TransportError, TransportResult};
use super::{WorkerEndpoint, WorkerEvent, WorkerLink, WorkerPort, WorkerSpawner};

struct ChannelPort {
    tx: mpsc::UnboundedSender<WorkerInbound>,
    shutdown: CancellationToken,
}

impl WorkerPort for ChannelPort {
    fn post(&self, message: WorkerInbound) -> TransportResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }

    fn terminate(&self) {
        self.shutdown.cancel();
    }
}

/// Worker side of an in-process channel.
pub struct ChannelEndpoint {
    inbound: mpsc::UnboundedReceiver<WorkerInbound>,
    outbound: mpsc::UnboundedSender<WorkerEvent>,
    shutdown: CancellationToken,
}

impl ChannelEndpoint {
    /// Report a failure of the worker context itself.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.outbound.send(WorkerEvent::Failed(reason.into()));
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl WorkerEndpoint for ChannelEndpoint {
    async fn recv(&mut self) -> Option<WorkerInbound> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            message = self.inbound.recv() => message,
        }
    }

    async fn post(&mut self, message: WorkerOutbound) -> TransportResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(WorkerEvent::Message(message))
            .map_err(|_| TransportError::Closed)
    }
}

/// Build a connected link/endpoint pair without starting anything.
///
/// Useful for custom spawners that drive the endpoint themselves.
pub fn channel_link() -> (WorkerLink, ChannelEndpoint) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let link = WorkerLink {
        port: Arc::new(ChannelPort {
            tx: inbound_tx,
            shutdown: shutdown.clone(),
        }),
        events: outbound_rx,
    };
    let endpoint = ChannelEndpoint {
        inbound: inbound_rx,
        outbound: outbound_tx,
        shutdown,
    };
    (link, endpoint)
}

/// Spawns a [`Dispatcher`] on a dedicated OS thread.
#[derive(Clone)]
pub struct ThreadSpawner {
    loader: Arc<dyn EngineLoader>,
}

impl ThreadSpawner {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self { loader }
    }

    /// Spawner serving the built-in engine.
    pub fn native() -> Self {
        Self::new(Arc::new(NativeEngineLoader))
    }
}

#[async_trait]
impl WorkerSpawner for ThreadSpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let (link, mut endpoint) = channel_link();
        let loader = self.loader.clone();

        std::thread::Builder::new()
            .name("quantbridge-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        endpoint.fail(format!("failed to start worker runtime: {}", e));
                        return;
                    }
                };

                let dispatcher = Dispatcher::with_loader(loader);
                if let Err(e) = runtime.block_on(dispatcher.run(&mut endpoint)) {
                    tracing::debug!(error = %e, "worker loop stopped");
                }
            })
            .map_err(TransportError::SpawnFailed)?;

        Ok(link)
    }
}
