//! Built-in engine backed by `imagequant`.

use imagequant::{Attributes, QuantizationResult, RGBA};

use super::codec::{decode_png_to_rgba, encode_indexed_png};
use super::error::{EngineError, EngineResult};
use super::{
    check_rgba_len, pixel_count, DecodedImage, QuantizationEngine, QuantizedImage, Quantizer,
    Rgba,
};

/// `imagequant` + `png` engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl QuantizationEngine for NativeEngine {
    fn decode_to_rgba(&self, bytes: &[u8]) -> EngineResult<DecodedImage> {
        decode_png_to_rgba(bytes)
    }

    fn new_quantizer(&self) -> Box<dyn Quantizer> {
        Box::new(NativeQuantizer {
            attr: Attributes::new(),
        })
    }

    fn encode_indexed_image(
        &self,
        indices: &[u8],
        palette: &[Rgba],
        width: u32,
        height: u32,
    ) -> EngineResult<Vec<u8>> {
        encode_indexed_png(indices, palette, width, height)
    }
}

fn to_rgba_pixels(pixels: &[u8]) -> Vec<RGBA> {
    pixels
        .chunks_exact(4)
        .map(|c| RGBA::new(c[0], c[1], c[2], c[3]))
        .collect()
}

struct NativeQuantizer {
    attr: Attributes,
}

impl Quantizer for NativeQuantizer {
    fn set_speed(&mut self, speed: u8) -> EngineResult<()> {
        self.attr
            .set_speed(speed as i32)
            .map_err(|e| EngineError::option("speed", e))
    }

    fn set_quality(&mut self, min: u8, target: u8) -> EngineResult<()> {
        self.attr
            .set_quality(min, target)
            .map_err(|e| EngineError::option("quality", e))
    }

    fn set_max_colors(&mut self, colors: u32) -> EngineResult<()> {
        self.attr
            .set_max_colors(colors)
            .map_err(|e| EngineError::option("max colors", e))
    }

    fn set_posterization(&mut self, bits: u8) -> EngineResult<()> {
        self.attr
            .set_min_posterization(bits)
            .map_err(|e| EngineError::option("posterization", e))
    }

    fn quantize(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> EngineResult<Box<dyn QuantizedImage>> {
        check_rgba_len(pixels, width, height)?;

        let mut image = self
            .attr
            .new_image(
                to_rgba_pixels(pixels),
                width as usize,
                height as usize,
                0.0,
            )
            .map_err(|e| EngineError::Quantize(format!("failed to create image: {:?}", e)))?;

        let result = self
            .attr
            .quantize(&mut image)
            .map_err(|e| EngineError::Quantize(format!("{:?}", e)))?;

        Ok(Box::new(NativeQuantized {
            result,
            remapped_palette: None,
        }))
    }
}

struct NativeQuantized {
    result: QuantizationResult,
    /// Palette as refined by the last remap; indices refer to this one.
    remapped_palette: Option<Vec<Rgba>>,
}

impl NativeQuantized {
    fn remapped(&mut self, pixels: &[u8], width: u32, height: u32) -> EngineResult<Vec<u8>> {
        check_rgba_len(pixels, width, height)?;

        let attr = Attributes::new();
        let rgba = to_rgba_pixels(pixels);
        let mut image = attr
            .new_image_borrowed(&rgba, width as usize, height as usize, 0.0)
            .map_err(|e| EngineError::Quantize(format!("failed to create image: {:?}", e)))?;

        let (palette, indices) = self
            .result
            .remapped(&mut image)
            .map_err(|e| EngineError::Quantize(format!("failed to remap image: {:?}", e)))?;

        let expected = pixel_count(width, height)?;
        if indices.len() != expected {
            return Err(EngineError::Quantize(format!(
                "index data length mismatch: got {} indices, expected {}",
                indices.len(),
                expected
            )));
        }

        self.remapped_palette = Some(palette.iter().map(|c| [c.r, c.g, c.b, c.a]).collect());
        Ok(indices)
    }
}

impl QuantizedImage for NativeQuantized {
    fn palette(&mut self) -> Vec<Rgba> {
        match &self.remapped_palette {
            Some(palette) => palette.clone(),
            None => self
                .result
                .palette()
                .iter()
                .map(|c| [c.r, c.g, c.b, c.a])
                .collect(),
        }
    }

    fn quality(&self) -> f64 {
        self.result.quantization_quality().unwrap_or(0) as f64 / 100.0
    }

    fn palette_size(&mut self) -> usize {
        match &self.remapped_palette {
            Some(palette) => palette.len(),
            None => self.result.palette().len(),
        }
    }

    fn set_dithering(&mut self, level: f32) -> EngineResult<()> {
        self.result
            .set_dithering_level(level)
            .map_err(|e| EngineError::option("dithering", e))
    }

    fn remap(&mut self, pixels: &[u8], width: u32, height: u32) -> EngineResult<Vec<u8>> {
        let indices = self.remapped(pixels, width, height)?;
        let palette = self.palette();

        let mut out = Vec::with_capacity(indices.len() * 4);
        for index in indices {
            match palette.get(index as usize) {
                Some(color) => out.extend_from_slice(color),
                None => out.extend_from_slice(&[0, 0, 0, 255]),
            }
        }
        Ok(out)
    }

    fn palette_indices(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> EngineResult<Vec<u8>> {
        self.remapped(pixels, width, height)
    }
}
