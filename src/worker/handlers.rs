//! Quantization request handlers.
//!
//! Both actions share one pipeline. The step order is fixed because later
//! engine calls depend on state set by earlier ones:
//!
//! 1. obtain RGBA pixels (given, or decoded)
//! 2. fresh quantizer
//! 3. speed, quality, max colors, posterization (each only if supplied)
//! 4. quantize
//! 5. dithering (only if supplied)
//! 6. remap, then palette indices
//! 7. indexed encode (encoded requests only)
//! 8. assemble the result

use crate::engine::{check_rgba_len, QuantizationEngine};
use crate::protocol::{EncodedImageParams, QuantizeOptions, QuantizeResult, RawImageParams};

use super::error::DispatchError;

/// Source of the pixels for one request.
enum Input {
    Encoded(Vec<u8>),
    Raw {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
    },
}

pub(crate) fn quantize_encoded(
    engine: &dyn QuantizationEngine,
    params: EncodedImageParams,
) -> Result<QuantizeResult, DispatchError> {
    run_pipeline(engine, Input::Encoded(params.image), &params.options)
}

pub(crate) fn quantize_raw(
    engine: &dyn QuantizationEngine,
    params: RawImageParams,
) -> Result<QuantizeResult, DispatchError> {
    let input = Input::Raw {
        pixels: params.pixels,
        width: params.width,
        height: params.height,
    };
    run_pipeline(engine, input, &params.options)
}

fn run_pipeline(
    engine: &dyn QuantizationEngine,
    input: Input,
    options: &QuantizeOptions,
) -> Result<QuantizeResult, DispatchError> {
    options.validate().map_err(DispatchError::InvalidOptions)?;

    let encode = matches!(input, Input::Encoded(_));
    let (pixels, width, height) = match input {
        Input::Encoded(bytes) => {
            let decoded = engine.decode_to_rgba(&bytes)?;
            (decoded.pixels, decoded.width, decoded.height)
        }
        Input::Raw {
            pixels,
            width,
            height,
        } => {
            check_rgba_len(&pixels, width, height)?;
            (pixels, width, height)
        }
    };

    let mut quantizer = engine.new_quantizer();
    if let Some(speed) = options.speed {
        quantizer.set_speed(speed)?;
    }
    if let Some(quality) = options.quality {
        quantizer.set_quality(quality.min, quality.target)?;
    }
    if let Some(colors) = options.max_colors {
        quantizer.set_max_colors(colors)?;
    }
    if let Some(bits) = options.posterization {
        quantizer.set_posterization(bits)?;
    }

    let mut result = quantizer.quantize(&pixels, width, height)?;

    if let Some(level) = options.dithering {
        result.set_dithering(level)?;
    }

    let remapped = result.remap(&pixels, width, height)?;
    let indices = result.palette_indices(&pixels, width, height)?;
    let palette = result.palette();

    let image = if encode {
        Some(engine.encode_indexed_image(&indices, &palette, width, height)?)
    } else {
        None
    };

    Ok(QuantizeResult {
        palette_size: result.palette_size(),
        quality: result.quality(),
        palette,
        width,
        height,
        pixels: if encode { None } else { Some(remapped) },
        image,
    })
}
