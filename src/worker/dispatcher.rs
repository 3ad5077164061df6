//! Request routing inside the worker context.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Instrument;

use crate::engine::{EngineLoader, QuantizationEngine};
use crate::protocol::{
    Action, Control, RequestEnvelope, ResponseEnvelope, WorkerInbound, WorkerOutbound,
};
use crate::transport::{TransportResult, WorkerEndpoint};

use super::error::DispatchError;
use super::handlers;
use super::session::WorkerSession;

/// Routes inbound messages to handlers and builds correlated responses.
///
/// Requests are processed one at a time, in arrival order. Failures never
/// escape as anything but a failed [`ResponseEnvelope`] carrying message text.
pub struct Dispatcher {
    session: WorkerSession,
}

impl Dispatcher {
    pub fn new(session: WorkerSession) -> Self {
        Self { session }
    }

    pub fn with_loader(loader: Arc<dyn EngineLoader>) -> Self {
        Self::new(WorkerSession::new(loader))
    }

    pub fn session(&self) -> &WorkerSession {
        &self.session
    }

    /// Announce readiness, then serve the endpoint until it closes.
    pub async fn run<E: WorkerEndpoint>(&self, endpoint: &mut E) -> TransportResult<()> {
        endpoint.post(WorkerOutbound::Control(Control::Ready)).await?;
        tracing::debug!("worker ready");

        while let Some(message) = endpoint.recv().await {
            if let Some(response) = self.handle(message).await {
                endpoint.post(WorkerOutbound::Response(response)).await?;
            }
        }

        tracing::debug!("worker endpoint closed");
        Ok(())
    }

    /// Handle one inbound message. Control messages produce no response.
    pub async fn handle(&self, message: WorkerInbound) -> Option<ResponseEnvelope> {
        match message {
            WorkerInbound::Control(Control::Configure { wasm_url }) => {
                tracing::debug!(url = %wasm_url, "engine url override received");
                self.session.configure(wasm_url);
                None
            }
            WorkerInbound::Control(Control::Ready) => {
                tracing::warn!("ignoring ready message sent to worker");
                None
            }
            WorkerInbound::Request(request) => Some(self.handle_request(request).await),
        }
    }

    /// Execute a request and build its response.
    pub async fn handle_request(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope { id, action, data } = request;
        let span = tracing::debug_span!("request", id, action = %action);

        match self.execute(&action, data).instrument(span).await {
            Ok(result) => ResponseEnvelope::success(id, result),
            Err(err) => {
                tracing::debug!(error = %err, "request failed");
                ResponseEnvelope::failure(id, err.to_string())
            }
        }
    }

    async fn execute(
        &self,
        action: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        let engine = self.session.engine().await?;

        let action: Action = action.parse().map_err(DispatchError::UnknownAction)?;
        match action {
            Action::QuantizeEncoded => run_handler(action, &engine, data, handlers::quantize_encoded),
            Action::QuantizeRaw => run_handler(action, &engine, data, handlers::quantize_raw),
        }
    }
}

fn run_handler<P, R, F>(
    action: Action,
    engine: &Arc<dyn QuantizationEngine>,
    data: serde_json::Value,
    handler: F,
) -> Result<serde_json::Value, DispatchError>
where
    P: DeserializeOwned,
    R: Serialize,
    F: FnOnce(&dyn QuantizationEngine, P) -> Result<R, DispatchError>,
{
    let params: P = serde_json::from_value(data).map_err(|source| DispatchError::InvalidData {
        action: action.as_str(),
        source,
    })?;

    let outcome = catch_unwind(AssertUnwindSafe(|| handler(engine.as_ref(), params)))
        .map_err(|payload| DispatchError::Panicked(panic_message(payload.as_ref())))??;

    serde_json::to_value(outcome).map_err(DispatchError::SerializeFailed)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
