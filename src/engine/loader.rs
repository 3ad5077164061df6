//! Engine module URLs and the built-in loader.

use std::sync::Arc;

use url::Url;

use super::error::{EngineError, EngineResult};
use super::native::NativeEngine;
use super::{EngineLoader, QuantizationEngine};

/// Module name joined onto directory-style URLs.
pub const DEFAULT_ENGINE_MODULE: &str = "imagequant";

/// Location used when no override was configured.
pub const DEFAULT_ENGINE_URL: &str = "builtin:imagequant";

/// Resolve the effective engine URL.
///
/// An override ending in `/` names a directory and gets
/// [`DEFAULT_ENGINE_MODULE`] joined onto it; any other override is used as
/// given. Without an override the built-in location applies.
pub fn resolve_engine_url(override_url: Option<&str>) -> EngineResult<String> {
    let Some(raw) = override_url else {
        return Ok(DEFAULT_ENGINE_URL.to_string());
    };

    let base = Url::parse(raw).map_err(|e| EngineError::load(raw, e.to_string()))?;
    if base.cannot_be_a_base() || !base.path().ends_with('/') {
        return Ok(base.to_string());
    }

    base.join(DEFAULT_ENGINE_MODULE)
        .map(|url| url.to_string())
        .map_err(|e| EngineError::load(raw, e.to_string()))
}

/// Serves the statically linked [`NativeEngine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngineLoader;

impl EngineLoader for NativeEngineLoader {
    fn load(&self, url: &str) -> EngineResult<Arc<dyn QuantizationEngine>> {
        let parsed = Url::parse(url).map_err(|e| EngineError::load(url, e.to_string()))?;

        let module = match parsed.scheme() {
            "builtin" => parsed.path().to_string(),
            "file" => parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string(),
            scheme => {
                return Err(EngineError::load(
                    url,
                    format!("unsupported scheme '{}'", scheme),
                ))
            }
        };

        if module != DEFAULT_ENGINE_MODULE {
            return Err(EngineError::load(
                url,
                format!("unknown engine module '{}'", module),
            ));
        }

        tracing::info!(url, "loaded native quantization engine");
        Ok(Arc::new(NativeEngine::new()))
    }
}
