//! Worker-local session state.

use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::engine::{resolve_engine_url, EngineLoader, EngineResult, QuantizationEngine};

/// State owned by one worker instance.
///
/// The engine is loaded on first use. Concurrent callers that arrive while a
/// load is in flight wait for that same attempt. A failed load leaves the
/// session uninitialized, so the next request tries again.
pub struct WorkerSession {
    loader: Arc<dyn EngineLoader>,
    engine: OnceCell<Arc<dyn QuantizationEngine>>,
    engine_url_override: Mutex<Option<String>>,
}

impl WorkerSession {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            engine: OnceCell::new(),
            engine_url_override: Mutex::new(None),
        }
    }

    /// Record an engine URL override from a Configure message.
    ///
    /// Dropped once the engine is loaded, so the stored override always names
    /// the URL the engine came from.
    pub fn configure(&self, url: impl Into<String>) {
        let url = url.into();
        if self.is_initialized() {
            tracing::warn!(url = %url, "configure received after engine initialization, ignoring");
            return;
        }
        *self
            .engine_url_override
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(url);
    }

    pub fn engine_url_override(&self) -> Option<String> {
        self.engine_url_override
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }

    /// Return the engine, loading it on first use.
    pub async fn engine(&self) -> EngineResult<Arc<dyn QuantizationEngine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let url = resolve_engine_url(self.engine_url_override().as_deref())?;
                tracing::info!(url = %url, "initializing quantization engine");
                self.loader.load(&url)
            })
            .await?;
        Ok(engine.clone())
    }
}
