// tests/engine/quantize_test.rs
use proptest::prelude::*;
use quantbridge::engine::{
    decode_png_to_rgba, EngineLoader, NativeEngine, NativeEngineLoader, QuantizationEngine,
    DEFAULT_ENGINE_URL,
};
use quantbridge::{ClientConfig, ClientError, QuantizeClient, QuantizeOptions};

fn rgba_png(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(pixels).unwrap();
    writer.finish().unwrap();
    out
}

fn solid(color: [u8; 4], width: u32, height: u32) -> Vec<u8> {
    color.repeat((width * height) as usize)
}

#[tokio::test]
async fn test_solid_image_collapses_to_one_color() {
    let client = QuantizeClient::new(ClientConfig::default());
    let png = rgba_png(&solid([200, 30, 30, 255], 4, 4), 4, 4);

    let result = client
        .quantize_encoded(png, QuantizeOptions::default().with_max_colors(2))
        .await
        .unwrap();

    assert_eq!(result.palette_size, 1);
    assert_eq!(result.palette.len(), 1);
    assert!((result.quality - 1.0).abs() < 0.01, "quality {}", result.quality);
    assert_eq!((result.width, result.height), (4, 4));
    assert!(result.pixels.is_none());

    let decoded = decode_png_to_rgba(result.image.as_deref().unwrap()).unwrap();
    assert_eq!((decoded.width, decoded.height), (4, 4));
    assert_eq!(decoded.pixels, solid(result.palette[0], 4, 4));
}

#[tokio::test]
async fn test_raw_gradient_respects_max_colors() {
    let client = QuantizeClient::new(ClientConfig::default());
    let (width, height) = (16u32, 16u32);
    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i % 256) as u8, (i * 7 % 256) as u8, (i * 13 % 256) as u8, 255])
        .collect();

    let options = QuantizeOptions::default()
        .with_max_colors(8)
        .with_speed(10)
        .with_dithering(0.0);
    let result = client
        .quantize_raw(pixels, width, height, options)
        .await
        .unwrap();

    assert!(result.palette_size >= 1 && result.palette_size <= 8);
    assert_eq!(result.palette.len(), result.palette_size);
    assert!(result.quality >= 0.0 && result.quality <= 1.0);
    assert_eq!(
        result.pixels.map(|p| p.len()),
        Some((width * height * 4) as usize)
    );
}

#[tokio::test]
async fn test_malformed_png_is_operation_error() {
    let client = QuantizeClient::new(ClientConfig::default());

    let err = client
        .quantize_encoded(b"definitely not a png".to_vec(), QuantizeOptions::default())
        .await
        .unwrap_err();

    match err {
        ClientError::Operation(message) => assert!(message.contains("decode"), "{}", message),
        other => panic!("expected operation error, got {:?}", other),
    }
    // The worker survives a failed request.
    let png = rgba_png(&solid([0, 0, 0, 255], 2, 2), 2, 2);
    assert!(client
        .quantize_encoded(png, QuantizeOptions::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_mismatched_raw_length_is_operation_error() {
    let client = QuantizeClient::new(ClientConfig::default());

    let err = client
        .quantize_raw(vec![0; 12], 2, 2, QuantizeOptions::default())
        .await
        .unwrap_err();
    assert!(err.operation_message().is_some(), "got {:?}", err);
}

#[test]
fn test_builtin_loader_serves_native_engine() {
    let engine = NativeEngineLoader.load(DEFAULT_ENGINE_URL).unwrap();
    let decoded = engine
        .decode_to_rgba(&rgba_png(&solid([1, 2, 3, 4], 3, 2), 3, 2))
        .unwrap();
    assert_eq!((decoded.width, decoded.height), (3, 2));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_palette_size_within_max_colors(
        max_colors in 2u32..=32,
        seed in any::<u32>(),
    ) {
        let (width, height) = (8u32, 8u32);
        let pixels: Vec<u8> = (0..width * height)
            .flat_map(|i| {
                let v = i.wrapping_mul(2654435761).wrapping_add(seed);
                [v as u8, (v >> 8) as u8, (v >> 16) as u8, 255]
            })
            .collect();

        let engine = NativeEngine::new();
        let mut quantizer = engine.new_quantizer();
        quantizer.set_max_colors(max_colors).unwrap();
        quantizer.set_speed(10).unwrap();
        let mut quantized = quantizer.quantize(&pixels, width, height).unwrap();
        quantized.remap(&pixels, width, height).unwrap();

        let size = quantized.palette_size();
        prop_assert!(size >= 1);
        prop_assert!(size <= max_colors as usize);
    }
}
