use std::collections::HashMap;

use crate::error::CoreResult;
use crate::model::{Frame, Region, TextBlock, TranslatedBlock};
use crate::plugin::settings::SettingValue;

pub type Settings = HashMap<String, SettingValue>;

/// A Capture backend: samples pixels for a configured region.
pub trait CapturePlugin: Send + Sync {
    fn init(&mut self, settings: &Settings) -> CoreResult<()>;
    fn capture(&mut self, region: &Region, frame_id: u64) -> CoreResult<Frame>;
    fn cleanup(&mut self) -> CoreResult<()>;
}

/// An OCR backend: extracts text fragments from a Frame.
pub trait OcrPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn init(&mut self, settings: &Settings) -> CoreResult<()>;
    fn extract(&mut self, frame: &Frame) -> CoreResult<Vec<TextBlock>>;
    fn supported_languages(&self) -> Vec<String>;
    fn cleanup(&mut self) -> CoreResult<()>;
}

/// A translation backend.
pub trait TranslationPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn init(&mut self, settings: &Settings) -> CoreResult<()>;
    fn translate(&mut self, text: &str, source: &str, target: &str) -> CoreResult<(String, f32)>;

    /// Batched translation; defaults to a per-text loop over `translate`.
    fn translate_batch(
        &mut self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> CoreResult<Vec<(String, f32)>> {
        texts
            .iter()
            .map(|t| self.translate(t, source, target))
            .collect()
    }

    fn cleanup(&mut self) -> CoreResult<()>;

    /// Whether `translate`/`translate_batch` may be called concurrently
    /// from multiple Translate worker threads. Default false: Translate
    /// is serialized per plugin instance, per §5.
    fn reentrant(&self) -> bool {
        false
    }
}

/// An Overlay renderer: fire-and-forget display I/O.
pub trait OverlayRenderer: Send + Sync {
    fn render(&mut self, frame_id: u64, blocks: &[TranslatedBlock]) -> bool;
}

/// A Preprocess backend: transforms a Frame before OCR (e.g. denoise,
/// upscale). Optional stage; absent means the Frame passes through
/// unchanged.
pub trait PreprocessPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn init(&mut self, settings: &Settings) -> CoreResult<()>;
    fn process(&mut self, frame: Frame) -> CoreResult<Frame>;
    fn cleanup(&mut self) -> CoreResult<()>;
}

/// A Validate backend: filters/annotates OCR output before translation.
/// Optional stage; absent means all TextBlocks pass through.
pub trait ValidatePlugin: Send + Sync {
    fn name(&self) -> &str;
    fn init(&mut self, settings: &Settings) -> CoreResult<()>;
    fn validate(&mut self, blocks: Vec<TextBlock>) -> CoreResult<Vec<TextBlock>>;
    fn cleanup(&mut self) -> CoreResult<()>;
}
