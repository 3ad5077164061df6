//! Async client for offloading quantization to a worker context.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::error::{ClientError, ClientResult};
use crate::protocol::{
    Action, Control, EncodedImageParams, QuantizeOptions, QuantizeResult, RawImageParams,
    RequestEnvelope, ResponseEnvelope, WorkerInbound, WorkerOutbound,
};
use crate::registry::{DeferredError, DeferredRegistry};
use crate::transport::{
    ProcessSpawner, ThreadSpawner, TransportError, WorkerEvent, WorkerLink, WorkerPort,
    WorkerSpawner,
};

/// Default ready-handshake timeout (10 seconds).
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 10_000;

/// Default per-operation timeout (30 seconds).
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Client construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Worker executable. `None` runs the worker on an in-process thread.
    pub worker_url: Option<PathBuf>,
    /// Engine module URL sent to the worker in a Configure message.
    pub engine_url: Option<String>,
    /// Bound on spawn-to-ready.
    pub init_timeout: Duration,
    /// Bound on each individual call.
    pub operation_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            worker_url: None,
            engine_url: None,
            init_timeout: Duration::from_millis(DEFAULT_INIT_TIMEOUT_MS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    pub fn with_worker_url<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.worker_url = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_engine_url(mut self, url: impl Into<String>) -> Self {
        self.engine_url = Some(url.into());
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Spawner matching `worker_url`.
    pub fn spawner(&self) -> Arc<dyn WorkerSpawner> {
        match &self.worker_url {
            Some(path) => Arc::new(ProcessSpawner::new(path)),
            None => Arc::new(ThreadSpawner::native()),
        }
    }
}

/// Lifecycle of the client as seen by callers.
#[derive(Clone)]
enum ClientState {
    Starting,
    Ready(Arc<dyn WorkerPort>),
    Failed(String),
    Exited(String),
    Disposed,
}

impl ClientState {
    fn is_starting(&self) -> bool {
        matches!(self, ClientState::Starting)
    }
}

/// Promise-style facade over a worker context.
///
/// Construction never blocks: the worker is spawned on a background task and
/// calls made in the meantime wait for the ready handshake. Each call gets a
/// fresh correlation id, so any number of calls can be outstanding over the
/// single ordered channel.
///
/// # Example
///
/// ```ignore
/// use quantbridge::{ClientConfig, QuantizeClient, QuantizeOptions};
///
/// let client = QuantizeClient::new(ClientConfig::default());
/// let result = client
///     .quantize_raw(pixels, 64, 64, QuantizeOptions::default().with_max_colors(16))
///     .await?;
/// println!("{} colors, quality {:.2}", result.palette_size, result.quality);
/// client.dispose();
/// ```
pub struct QuantizeClient {
    config: ClientConfig,
    registry: DeferredRegistry<Value, String>,
    state: Arc<watch::Sender<ClientState>>,
    shutdown: CancellationToken,
}

impl QuantizeClient {
    /// Start a client with the spawner implied by `config.worker_url`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        let spawner = config.spawner();
        Self::with_spawner(config, spawner)
    }

    /// Start a client over a custom spawner.
    pub fn with_spawner(config: ClientConfig, spawner: Arc<dyn WorkerSpawner>) -> Self {
        let (state, _) = watch::channel(ClientState::Starting);
        let state = Arc::new(state);
        let registry = DeferredRegistry::new();
        let shutdown = CancellationToken::new();

        let event_loop = EventLoop {
            engine_url: config.engine_url.clone(),
            init_timeout: config.init_timeout,
            registry: registry.clone(),
            state: state.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(event_loop.run(spawner));

        Self {
            config,
            registry,
            state,
            shutdown,
        }
    }

    /// Whether the ready handshake completed and the worker is still usable.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), ClientState::Ready(_))
    }

    /// Number of calls waiting for a response.
    pub fn pending_operations(&self) -> usize {
        self.registry.len()
    }

    /// Wait for initialization to settle.
    pub async fn ready(&self) -> ClientResult<()> {
        self.wait_ready().await.map(|_| ())
    }

    /// Send a request to the worker and wait for its correlated response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - initialization failed or timed out
    /// - the worker reports a failure (including unknown actions)
    /// - no response arrives within the operation timeout
    /// - the client is disposed or the worker exits first
    pub async fn call(&self, action: &str, data: Value) -> ClientResult<Value> {
        let port = self.wait_ready().await?;

        let deferred = self.registry.register(self.config.operation_timeout);
        let id = deferred.id();
        tracing::debug!(id, action, "posting request");

        let request = WorkerInbound::Request(RequestEnvelope {
            id,
            action: action.to_string(),
            data,
        });
        if let Err(e) = port.post(request) {
            self.registry.reject(id, e.to_string());
            return Err(self.post_error(e));
        }

        match deferred.await {
            Ok(value) => Ok(value),
            Err(DeferredError::Rejected(message)) => Err(ClientError::Operation(message)),
            Err(DeferredError::TimedOut(timeout)) => Err(ClientError::OperationTimeout {
                id,
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(DeferredError::Cancelled) => Err(self.terminal_error()),
        }
    }

    /// Quantize PNG bytes; the result carries an indexed PNG in `image`.
    pub async fn quantize_encoded(
        &self,
        image: Vec<u8>,
        options: QuantizeOptions,
    ) -> ClientResult<QuantizeResult> {
        let params = EncodedImageParams { image, options };
        self.typed_call(Action::QuantizeEncoded, params).await
    }

    /// Quantize raw RGBA8 pixels; the result carries remapped pixels in `pixels`.
    pub async fn quantize_raw(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        options: QuantizeOptions,
    ) -> ClientResult<QuantizeResult> {
        let params = RawImageParams {
            pixels,
            width,
            height,
            options,
        };
        self.typed_call(Action::QuantizeRaw, params).await
    }

    /// Terminate the worker and cancel every outstanding call.
    ///
    /// Outstanding and future calls fail with [`ClientError::Disposed`].
    pub fn dispose(&self) {
        let previous = self.state.send_replace(ClientState::Disposed);
        if let ClientState::Ready(port) = &previous {
            port.terminate();
        }
        self.shutdown.cancel();

        let cancelled = self.registry.cancel_all();
        if !matches!(previous, ClientState::Disposed) {
            tracing::info!(cancelled, "client disposed");
        }
    }

    async fn typed_call<P: serde::Serialize>(
        &self,
        action: Action,
        params: P,
    ) -> ClientResult<QuantizeResult> {
        let data = serde_json::to_value(params).map_err(ClientError::SerializeFailed)?;
        let value = self.call(action.as_str(), data).await?;
        serde_json::from_value(value).map_err(ClientError::DeserializeFailed)
    }

    async fn wait_ready(&self) -> ClientResult<Arc<dyn WorkerPort>> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| !state.is_starting())
            .await
            .map(|state| state.clone())
            .unwrap_or(ClientState::Disposed);

        match state {
            ClientState::Ready(port) => Ok(port),
            ClientState::Failed(reason) => Err(ClientError::Initialization(reason)),
            ClientState::Exited(reason) => Err(ClientError::WorkerExited(reason)),
            ClientState::Starting | ClientState::Disposed => Err(ClientError::Disposed),
        }
    }

    /// Error for a post that failed because the worker went away meanwhile.
    fn post_error(&self, error: TransportError) -> ClientError {
        match &*self.state.borrow() {
            ClientState::Exited(reason) => ClientError::WorkerExited(reason.clone()),
            ClientState::Disposed => ClientError::Disposed,
            _ => ClientError::Transport(error),
        }
    }

    /// Error for a call whose registry entry was cancelled.
    fn terminal_error(&self) -> ClientError {
        match &*self.state.borrow() {
            ClientState::Exited(reason) => ClientError::WorkerExited(reason.clone()),
            _ => ClientError::Disposed,
        }
    }
}

impl Drop for QuantizeClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Background task owning the worker link.
struct EventLoop {
    engine_url: Option<String>,
    init_timeout: Duration,
    registry: DeferredRegistry<Value, String>,
    state: Arc<watch::Sender<ClientState>>,
    shutdown: CancellationToken,
}

impl EventLoop {
    async fn run(self, spawner: Arc<dyn WorkerSpawner>) {
        let deadline = tokio::time::sleep(self.init_timeout);
        tokio::pin!(deadline);

        let spawned = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            _ = &mut deadline => {
                self.fail_init(self.timeout_reason());
                return;
            }
            spawned = spawner.spawn() => spawned,
        };

        let WorkerLink { port, mut events } = match spawned {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn worker");
                self.fail_init(e.to_string());
                return;
            }
        };

        let mut ready = false;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = &mut deadline, if !ready => {
                    tracing::warn!(timeout_ms = self.init_timeout.as_millis() as u64, "worker did not become ready");
                    self.fail_init(self.timeout_reason());
                    break;
                }
                event = events.recv() => match event {
                    Some(WorkerEvent::Message(WorkerOutbound::Control(Control::Ready))) => {
                        if ready {
                            tracing::warn!("ignoring duplicate ready message");
                        } else if let Err(e) = self.on_ready(&port) {
                            self.fail_init(e);
                            break;
                        } else {
                            ready = true;
                        }
                    }
                    Some(WorkerEvent::Message(WorkerOutbound::Control(Control::Configure { .. }))) => {
                        tracing::warn!("ignoring configure message from worker");
                    }
                    Some(WorkerEvent::Message(WorkerOutbound::Response(response))) => {
                        self.settle(response);
                    }
                    Some(WorkerEvent::Failed(reason)) => {
                        self.worker_gone(ready, &port, reason);
                        break;
                    }
                    None => {
                        self.worker_gone(ready, &port, "worker channel closed".to_string());
                        break;
                    }
                },
            }
        }

        port.terminate();
    }

    /// Post Configure (if any) before publishing readiness, so the override
    /// is ahead of every request on the channel.
    fn on_ready(&self, port: &Arc<dyn WorkerPort>) -> Result<(), String> {
        if let Some(url) = &self.engine_url {
            port.post(WorkerInbound::Control(Control::Configure {
                wasm_url: url.clone(),
            }))
            .map_err(|e| format!("failed to configure worker: {}", e))?;
        }

        let published = self.state.send_if_modified(|state| {
            if state.is_starting() {
                *state = ClientState::Ready(port.clone());
                true
            } else {
                false
            }
        });
        if published {
            tracing::info!("worker ready");
        }
        Ok(())
    }

    fn settle(&self, response: ResponseEnvelope) {
        let ResponseEnvelope {
            id,
            success,
            result,
            error,
        } = response;

        let outcome = if success {
            Ok(result.unwrap_or(Value::Null))
        } else {
            Err(error.unwrap_or_else(|| "unknown worker error".to_string()))
        };

        if !self.registry.settle(id, outcome) {
            tracing::debug!(id, "dropping response with no pending operation");
        }
    }

    fn fail_init(&self, reason: String) {
        self.state.send_if_modified(|state| {
            if state.is_starting() {
                *state = ClientState::Failed(reason);
                true
            } else {
                false
            }
        });
    }

    /// Publish the exit, close the port, then reject. A call that slips in
    /// after the sweep fails its post and sees the exit state.
    fn worker_gone(&self, ready: bool, port: &Arc<dyn WorkerPort>, reason: String) {
        if !ready {
            self.fail_init(reason);
            return;
        }

        tracing::warn!(reason = %reason, "worker exited");
        self.state.send_if_modified(|state| {
            if matches!(state, ClientState::Ready(_)) {
                *state = ClientState::Exited(reason);
                true
            } else {
                false
            }
        });
        port.terminate();

        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            tracing::warn!(cancelled, "rejected pending operations after worker exit");
        }
    }

    fn timeout_reason(&self) -> String {
        format!(
            "worker not ready after {} ms",
            self.init_timeout.as_millis()
        )
    }
}
