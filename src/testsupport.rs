//! Stub plugins implementing the external-collaborator traits (§6), used
//! by unit tests and by `tests/scenarios.rs`'s end-to-end scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::model::{Frame, PixelFormat, Rect, Region, TextBlock, TranslatedBlock};
use crate::plugin::traits::Settings;
use crate::plugin::{CapturePlugin, OcrPlugin, OverlayRenderer, TranslationPlugin};

/// Always returns the same pixel buffer (configurable via `set_pixels`) for
/// a region, stamped with the caller-supplied `frame_id`.
pub struct StubCapture {
    pixels: Mutex<Vec<u8>>,
    width: u32,
    height: u32,
}

impl StubCapture {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: Mutex::new(vec![7u8; (width * height * 4) as usize]),
            width,
            height,
        }
    }

    pub fn set_pixels(&self, pixels: Vec<u8>) {
        *self.pixels.lock().expect("stub capture lock poisoned") = pixels;
    }
}

impl CapturePlugin for StubCapture {
    fn init(&mut self, _settings: &Settings) -> CoreResult<()> {
        Ok(())
    }

    fn capture(&mut self, region: &Region, frame_id: u64) -> CoreResult<Frame> {
        let pixels = self.pixels.lock().expect("stub capture lock poisoned").clone();
        Ok(Frame::new(frame_id, region.id, 0, pixels, self.width, self.height, PixelFormat::Rgba8))
    }

    fn cleanup(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Returns a fixed list of `TextBlock`s (ignoring actual pixel content, as
/// a real OCR engine is out of scope here) every call, re-stamped with the
/// frame's `frame_id`. Counts invocations for assertions.
pub struct StubOcr {
    name: String,
    template: Vec<TextBlock>,
    invocations: AtomicU64,
    fail_next: Mutex<u32>,
}

impl StubOcr {
    #[must_use]
    pub fn new(name: impl Into<String>, template: Vec<TextBlock>) -> Self {
        Self {
            name: name.into(),
            template,
            invocations: AtomicU64::new(0),
            fail_next: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn single(name: impl Into<String>, text: &str, confidence: f32) -> Self {
        Self::new(
            name,
            vec![TextBlock {
                frame_id: 0,
                bounds: Rect { x: 0, y: 0, w: 10, h: 10 },
                text: text.to_string(),
                confidence,
                ocr_engine: String::new(),
            }],
        )
    }

    #[must_use]
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// The next `n` calls to `extract` return an error, matching §8 S4's
    /// "fails N times then succeeds" shape.
    pub fn fail_next_n(&self, n: u32) {
        *self.fail_next.lock().expect("stub ocr lock poisoned") = n;
    }
}

impl OcrPlugin for StubOcr {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _settings: &Settings) -> CoreResult<()> {
        Ok(())
    }

    fn extract(&mut self, frame: &Frame) -> CoreResult<Vec<TextBlock>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut remaining = self.fail_next.lock().expect("stub ocr lock poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(CoreError::TransientEngine {
                engine: self.name.clone(),
                reason: "stub induced failure".to_string(),
            });
        }
        drop(remaining);
        let mut blocks = self.template.clone();
        for b in &mut blocks {
            b.frame_id = frame.frame_id;
            b.ocr_engine = self.name.clone();
        }
        Ok(blocks)
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["en".to_string()]
    }

    fn cleanup(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Translates via a fixed `(source_text, source_lang, target_lang) ->
/// (translation, confidence)` table. Unmapped inputs are an error.
pub struct StubTranslation {
    name: String,
    table: HashMap<(String, String, String), (String, f32)>,
    invocations: AtomicU64,
    fail_next: Mutex<u32>,
}

impl StubTranslation {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: HashMap::new(),
            invocations: AtomicU64::new(0),
            fail_next: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn with_entry(
        mut self,
        source_text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        translation: impl Into<String>,
        confidence: f32,
    ) -> Self {
        self.table.insert(
            (source_text.into(), source_lang.into(), target_lang.into()),
            (translation.into(), confidence),
        );
        self
    }

    #[must_use]
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn fail_next_n(&self, n: u32) {
        *self.fail_next.lock().expect("stub translation lock poisoned") = n;
    }
}

impl TranslationPlugin for StubTranslation {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _settings: &Settings) -> CoreResult<()> {
        Ok(())
    }

    fn translate(&mut self, text: &str, source: &str, target: &str) -> CoreResult<(String, f32)> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut remaining = self.fail_next.lock().expect("stub translation lock poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(CoreError::TransientEngine {
                engine: self.name.clone(),
                reason: "stub induced failure".to_string(),
            });
        }
        drop(remaining);
        self.table
            .get(&(text.to_string(), source.to_string(), target.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::TransientEngine {
                engine: self.name.clone(),
                reason: format!("no stub mapping for '{text}' {source}->{target}"),
            })
    }

    fn cleanup(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Collects every rendered frame for inspection by tests instead of doing
/// real display I/O.
#[derive(Default)]
pub struct StubOverlay {
    pub rendered: Mutex<Vec<(u64, Vec<TranslatedBlock>)>>,
}

impl StubOverlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.rendered.lock().expect("stub overlay lock poisoned").len()
    }
}

impl OverlayRenderer for StubOverlay {
    fn render(&mut self, frame_id: u64, blocks: &[TranslatedBlock]) -> bool {
        self.rendered
            .lock()
            .expect("stub overlay lock poisoned")
            .push((frame_id, blocks.to_vec()));
        true
    }
}
