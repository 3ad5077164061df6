//! Quantization adapter.
//!
//! The worker never touches pixels itself; it drives an engine through the
//! traits in this module. The built-in engine wraps `imagequant` for palette
//! generation and remapping and the `png` crate for decoding and indexed
//! encoding. Engines are produced lazily by an [`EngineLoader`] from a module
//! URL.
//!
//! Call order matters: option setters run before `quantize`, dithering runs on
//! the result handle before `remap`.

mod codec;
mod error;
mod loader;
mod native;
pub mod testing;

use std::sync::Arc;

pub use codec::{decode_png_to_rgba, encode_indexed_png};
pub use error::{EngineError, EngineResult};
pub use loader::{resolve_engine_url, NativeEngineLoader, DEFAULT_ENGINE_MODULE, DEFAULT_ENGINE_URL};
pub use native::NativeEngine;

/// RGBA color as `[r, g, b, a]`.
pub type Rgba = [u8; 4];

/// Decoded image in RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Entry point into an engine.
pub trait QuantizationEngine: Send + Sync {
    /// Decode encoded image bytes into RGBA8 pixels.
    fn decode_to_rgba(&self, bytes: &[u8]) -> EngineResult<DecodedImage>;

    /// Create a fresh quantizer with engine defaults.
    fn new_quantizer(&self) -> Box<dyn Quantizer>;

    /// Encode palette indices plus palette into the target image format.
    fn encode_indexed_image(
        &self,
        indices: &[u8],
        palette: &[Rgba],
        width: u32,
        height: u32,
    ) -> EngineResult<Vec<u8>>;
}

/// Pre-quantization attributes and the quantize step.
pub trait Quantizer {
    fn set_speed(&mut self, speed: u8) -> EngineResult<()>;
    fn set_quality(&mut self, min: u8, target: u8) -> EngineResult<()>;
    fn set_max_colors(&mut self, colors: u32) -> EngineResult<()>;
    fn set_posterization(&mut self, bits: u8) -> EngineResult<()>;

    fn quantize(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> EngineResult<Box<dyn QuantizedImage>>;
}

/// Handle to a finished quantization.
pub trait QuantizedImage {
    fn palette(&mut self) -> Vec<Rgba>;

    /// Achieved quality in 0.0–1.0.
    fn quality(&self) -> f64;

    fn palette_size(&mut self) -> usize;

    fn set_dithering(&mut self, level: f32) -> EngineResult<()>;

    /// Remap pixels through the palette, returning RGBA8.
    fn remap(&mut self, pixels: &[u8], width: u32, height: u32) -> EngineResult<Vec<u8>>;

    /// Palette index for every pixel.
    fn palette_indices(&mut self, pixels: &[u8], width: u32, height: u32)
        -> EngineResult<Vec<u8>>;
}

/// Loads an engine from a module URL.
pub trait EngineLoader: Send + Sync {
    fn load(&self, url: &str) -> EngineResult<Arc<dyn QuantizationEngine>>;
}

/// `width * height`, or an error if it does not fit in memory.
pub(crate) fn pixel_count(width: u32, height: u32) -> EngineResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| EngineError::InvalidInput("image dimensions overflow".to_string()))
}

/// Check that an RGBA buffer matches its dimensions.
pub(crate) fn check_rgba_len(pixels: &[u8], width: u32, height: u32) -> EngineResult<()> {
    let expected = pixel_count(width, height)?
        .checked_mul(4)
        .ok_or_else(|| EngineError::InvalidInput("image dimensions overflow".to_string()))?;
    if pixels.len() != expected {
        return Err(EngineError::InvalidInput(format!(
            "image data length {} doesn't match width * height * 4 ({})",
            pixels.len(),
            expected
        )));
    }
    Ok(())
}
