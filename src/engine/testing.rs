//! Deterministic engine doubles for dispatcher and client tests.
//!
//! [`ScriptedEngine`] treats encoded input as a single row of RGBA pixels and
//! builds its palette from the distinct colors it sees. Every adapter call is
//! appended to a shared [`CallJournal`] so tests can assert call order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::{EngineError, EngineResult};
use super::{
    check_rgba_len, DecodedImage, EngineLoader, QuantizationEngine, QuantizedImage, Quantizer,
    Rgba,
};

/// Shared, append-only log of adapter calls.
#[derive(Debug, Clone, Default)]
pub struct CallJournal(Arc<Mutex<Vec<String>>>);

impl CallJournal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Engine double with an optional artificial delay inside `quantize`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    journal: CallJournal,
    delay: Duration,
}

impl ScriptedEngine {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            delay: Duration::ZERO,
        }
    }

    /// Block the worker for `delay` on every quantize call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl QuantizationEngine for ScriptedEngine {
    fn decode_to_rgba(&self, bytes: &[u8]) -> EngineResult<DecodedImage> {
        self.journal.record("decode");
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(EngineError::Decode(format!(
                "expected RGBA row, got {} bytes",
                bytes.len()
            )));
        }
        Ok(DecodedImage {
            pixels: bytes.to_vec(),
            width: (bytes.len() / 4) as u32,
            height: 1,
        })
    }

    fn new_quantizer(&self) -> Box<dyn Quantizer> {
        self.journal.record("new_quantizer");
        Box::new(ScriptedQuantizer {
            journal: self.journal.clone(),
            delay: self.delay,
            max_colors: 256,
        })
    }

    fn encode_indexed_image(
        &self,
        indices: &[u8],
        palette: &[Rgba],
        _width: u32,
        _height: u32,
    ) -> EngineResult<Vec<u8>> {
        self.journal.record("encode");
        let mut out = Vec::with_capacity(palette.len() * 4 + indices.len());
        out.extend(palette.iter().flatten());
        out.extend_from_slice(indices);
        Ok(out)
    }
}

struct ScriptedQuantizer {
    journal: CallJournal,
    delay: Duration,
    max_colors: u32,
}

impl Quantizer for ScriptedQuantizer {
    fn set_speed(&mut self, speed: u8) -> EngineResult<()> {
        self.journal.record(format!("set_speed({})", speed));
        Ok(())
    }

    fn set_quality(&mut self, min: u8, target: u8) -> EngineResult<()> {
        self.journal.record(format!("set_quality({}, {})", min, target));
        Ok(())
    }

    fn set_max_colors(&mut self, colors: u32) -> EngineResult<()> {
        self.journal.record(format!("set_max_colors({})", colors));
        self.max_colors = colors;
        Ok(())
    }

    fn set_posterization(&mut self, bits: u8) -> EngineResult<()> {
        self.journal.record(format!("set_posterization({})", bits));
        Ok(())
    }

    fn quantize(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> EngineResult<Box<dyn QuantizedImage>> {
        self.journal.record("quantize");
        check_rgba_len(pixels, width, height)?;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        for chunk in pixels.chunks_exact(4) {
            let color = [chunk[0], chunk[1], chunk[2], chunk[3]];
            if seen.insert(color) {
                distinct.push(color);
            }
        }
        let quality = if distinct.len() <= self.max_colors as usize {
            1.0
        } else {
            0.5
        };
        distinct.truncate(self.max_colors as usize);

        Ok(Box::new(ScriptedResult {
            journal: self.journal.clone(),
            palette: distinct,
            quality,
        }))
    }
}

struct ScriptedResult {
    journal: CallJournal,
    palette: Vec<Rgba>,
    quality: f64,
}

impl ScriptedResult {
    fn index_of(&self, color: &[u8]) -> u8 {
        self.palette
            .iter()
            .position(|c| c[..] == *color)
            .unwrap_or(0) as u8
    }
}

impl QuantizedImage for ScriptedResult {
    fn palette(&mut self) -> Vec<Rgba> {
        self.palette.clone()
    }

    fn quality(&self) -> f64 {
        self.quality
    }

    fn palette_size(&mut self) -> usize {
        self.palette.len()
    }

    fn set_dithering(&mut self, level: f32) -> EngineResult<()> {
        self.journal.record(format!("set_dithering({})", level));
        Ok(())
    }

    fn remap(&mut self, pixels: &[u8], width: u32, height: u32) -> EngineResult<Vec<u8>> {
        self.journal.record("remap");
        check_rgba_len(pixels, width, height)?;
        Ok(pixels
            .chunks_exact(4)
            .flat_map(|c| self.palette[self.index_of(c) as usize])
            .collect())
    }

    fn palette_indices(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> EngineResult<Vec<u8>> {
        self.journal.record("palette_indices");
        check_rgba_len(pixels, width, height)?;
        Ok(pixels.chunks_exact(4).map(|c| self.index_of(c)).collect())
    }
}

/// Loader that records every URL it was asked to load.
#[derive(Debug, Clone)]
pub struct RecordingLoader {
    engine: Arc<ScriptedEngine>,
    loads: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    fail_with: Option<String>,
}

impl RecordingLoader {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            loads: Arc::default(),
            delay: Duration::ZERO,
            fail_with: None,
        }
    }

    /// Make every load block for `delay` before returning.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every load fail with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// URLs passed to `load`, in call order.
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl EngineLoader for RecordingLoader {
    fn load(&self, url: &str) -> EngineResult<Arc<dyn QuantizationEngine>> {
        self.loads
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(url.to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match &self.fail_with {
            Some(reason) => Err(EngineError::load(url, reason.clone())),
            None => Ok(self.engine.clone()),
        }
    }
}
