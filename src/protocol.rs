//! Protocol types for worker communication.
//!
//! Both contexts are built independently, so these shapes must stay stable.
//! Unknown fields are ignored on decode rather than rejected.
//!
//! ```text
//! Configure  { "type": "configure", "wasmUrl": string }
//! Ready      { "type": "ready" }
//! Request    { "id": u64, "action": string, "data": object }
//! Response   { "id": u64, "success": bool, "result"?: object, "error"?: string }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Control Messages
// ============================================================================

/// Control messages carry a `type` tag and never expect a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Control {
    /// Overrides the engine module location before lazy initialization.
    Configure {
        #[serde(rename = "wasmUrl")]
        wasm_url: String,
    },
    /// Posted once by the worker as soon as its loop starts.
    Ready,
}

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Request envelope sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, unique per client.
    pub id: u64,
    /// Action tag (e.g., "quantize_raw").
    pub action: String,
    /// Action-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Response envelope posted back by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request id this response corresponds to.
    pub id: u64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error text (present if success = false).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Anything the primary context posts to the worker.
///
/// Control messages are tried first: a request has no `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerInbound {
    Control(Control),
    Request(RequestEnvelope),
}

/// Anything the worker posts back to the primary context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerOutbound {
    Control(Control),
    Response(ResponseEnvelope),
}

/// Encode a message as a single NDJSON line (including the trailing newline).
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

// ============================================================================
// Actions
// ============================================================================

/// Action tags understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Decode a PNG, quantize, re-encode as an indexed PNG.
    QuantizeEncoded,
    /// Quantize raw RGBA pixels and return the remapped pixels.
    QuantizeRaw,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::QuantizeEncoded => "quantize_encoded",
            Action::QuantizeRaw => "quantize_raw",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quantize_encoded" => Ok(Action::QuantizeEncoded),
            "quantize_raw" => Ok(Action::QuantizeRaw),
            other => Err(other.to_string()),
        }
    }
}

// ============================================================================
// Quantization Options
// ============================================================================

/// Minimum and target quality, both 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRange {
    pub min: u8,
    pub target: u8,
}

/// Per-request engine options. Absent fields leave the engine default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizeOptions {
    /// 1 (slowest, best) to 10 (fastest).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityRange>,
    /// 2–256.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_colors: Option<u32>,
    /// 0.0–1.0, applied after quantization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dithering: Option<f32>,
    /// 0–4 bits of precision dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posterization: Option<u8>,
}

impl QuantizeOptions {
    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_quality(mut self, min: u8, target: u8) -> Self {
        self.quality = Some(QualityRange { min, target });
        self
    }

    pub fn with_max_colors(mut self, colors: u32) -> Self {
        self.max_colors = Some(colors);
        self
    }

    pub fn with_dithering(mut self, level: f32) -> Self {
        self.dithering = Some(level);
        self
    }

    pub fn with_posterization(mut self, bits: u8) -> Self {
        self.posterization = Some(bits);
        self
    }

    /// Check every supplied option against its accepted range.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(speed) = self.speed {
            if !(1..=10).contains(&speed) {
                return Err(format!("speed must be between 1 and 10, got {}", speed));
            }
        }
        if let Some(q) = self.quality {
            if q.min > 100 || q.target > 100 {
                return Err(format!(
                    "quality must be between 0 and 100, got {}-{}",
                    q.min, q.target
                ));
            }
            if q.min > q.target {
                return Err(format!(
                    "minimum quality {} exceeds target {}",
                    q.min, q.target
                ));
            }
        }
        if let Some(colors) = self.max_colors {
            if !(2..=256).contains(&colors) {
                return Err(format!(
                    "maxColors must be between 2 and 256, got {}",
                    colors
                ));
            }
        }
        if let Some(level) = self.dithering {
            if !(0.0..=1.0).contains(&level) {
                return Err(format!(
                    "dithering must be between 0.0 and 1.0, got {}",
                    level
                ));
            }
        }
        if let Some(bits) = self.posterization {
            if bits > 4 {
                return Err(format!(
                    "posterization must be between 0 and 4, got {}",
                    bits
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Request Payloads
// ============================================================================

/// Payload for `quantize_encoded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedImageParams {
    /// PNG bytes.
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,
    #[serde(default)]
    pub options: QuantizeOptions,
}

/// Payload for `quantize_raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImageParams {
    /// RGBA8 pixels, row-major.
    #[serde(with = "base64_bytes")]
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub options: QuantizeOptions,
}

// ============================================================================
// Result
// ============================================================================

/// Outcome of a quantization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizeResult {
    /// Palette entries as `[r, g, b, a]`.
    pub palette: Vec<[u8; 4]>,
    /// Achieved quality, 0.0–1.0.
    pub quality: f64,
    pub palette_size: usize,
    pub width: u32,
    pub height: u32,
    /// Remapped RGBA pixels (raw requests).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub pixels: Option<Vec<u8>>,
    /// Indexed PNG bytes (encoded requests).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub image: Option<Vec<u8>>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
