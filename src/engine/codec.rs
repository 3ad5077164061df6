//! PNG decoding to RGBA8 and indexed PNG encoding.

use std::io::Cursor;

use png::{BitDepth, ColorType, Decoder, Encoder, Transformations};

use super::error::{EngineError, EngineResult};
use super::{pixel_count, DecodedImage, Rgba};

/// Decode PNG bytes into RGBA8 pixels.
///
/// Palette, low bit-depth and 16-bit images are normalized to 8-bit first;
/// RGB and grayscale inputs get an opaque alpha channel.
pub fn decode_png_to_rgba(bytes: &[u8]) -> EngineResult<DecodedImage> {
    let mut decoder = Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);

    let mut reader = decoder
        .read_info()
        .map_err(|e| EngineError::Decode(format!("failed to read PNG info: {}", e)))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| EngineError::Decode(format!("failed to read PNG frame: {}", e)))?;
    buf.truncate(info.buffer_size());

    let pixels = match info.color_type {
        ColorType::Rgba => buf,
        ColorType::Rgb => {
            let mut rgba = Vec::with_capacity(buf.len() / 3 * 4);
            for chunk in buf.chunks_exact(3) {
                rgba.extend_from_slice(chunk);
                rgba.push(255);
            }
            rgba
        }
        ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity(buf.len() * 2);
            for chunk in buf.chunks_exact(2) {
                let (gray, alpha) = (chunk[0], chunk[1]);
                rgba.extend_from_slice(&[gray, gray, gray, alpha]);
            }
            rgba
        }
        ColorType::Grayscale => {
            let mut rgba = Vec::with_capacity(buf.len() * 4);
            for &gray in &buf {
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
            rgba
        }
        ColorType::Indexed => {
            return Err(EngineError::Decode(
                "indexed PNG was not expanded".to_string(),
            ))
        }
    };

    Ok(DecodedImage {
        pixels,
        width: info.width,
        height: info.height,
    })
}

/// Encode palette indices and palette as an 8-bit indexed PNG.
///
/// A tRNS chunk is written up to the last translucent palette entry.
pub fn encode_indexed_png(
    indices: &[u8],
    palette: &[Rgba],
    width: u32,
    height: u32,
) -> EngineResult<Vec<u8>> {
    let expected = pixel_count(width, height)?;
    if indices.len() != expected {
        return Err(EngineError::InvalidInput(format!(
            "palette indices length {} doesn't match width * height ({})",
            indices.len(),
            expected
        )));
    }
    if palette.is_empty() {
        return Err(EngineError::Encode("palette is empty".to_string()));
    }
    if palette.len() > 256 {
        return Err(EngineError::Encode(format!(
            "palette too large for PNG: {} colors (max 256)",
            palette.len()
        )));
    }
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= palette.len()) {
        return Err(EngineError::Encode(format!(
            "palette index {} out of range for {} colors",
            index,
            palette.len()
        )));
    }

    let rgb: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    let trns_len = palette
        .iter()
        .rposition(|c| c[3] < 255)
        .map(|last| last + 1)
        .unwrap_or(0);
    let trns: Vec<u8> = palette[..trns_len].iter().map(|c| c[3]).collect();

    let mut out = Vec::new();
    {
        let mut encoder = Encoder::new(&mut out, width, height);
        encoder.set_color(ColorType::Indexed);
        encoder.set_depth(BitDepth::Eight);
        encoder.set_palette(rgb);
        if !trns.is_empty() {
            encoder.set_trns(trns);
        }

        let mut writer = encoder
            .write_header()
            .map_err(|e| EngineError::Encode(format!("failed to write PNG header: {}", e)))?;
        writer
            .write_image_data(indices)
            .map_err(|e| EngineError::Encode(format!("failed to write PNG data: {}", e)))?;
        writer
            .finish()
            .map_err(|e| EngineError::Encode(format!("failed to finish PNG: {}", e)))?;
    }

    Ok(out)
}
