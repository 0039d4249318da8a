use serde::{Deserialize, Serialize};

use crate::model::region::Rect;

/// Provenance of a `TranslatedBlock`'s translated text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceOfTranslation {
    Engine,
    Cache,
    Dictionary,
    ChainFinal,
    ChainStep,
}

/// One OCR-detected text fragment bound to a Frame.
#[derive(Clone, Debug)]
pub struct TextBlock {
    pub frame_id: u64,
    pub bounds: Rect,
    pub text: String,
    pub confidence: f32,
    pub ocr_engine: String,
}

impl TextBlock {
    /// Checks the bounding-rectangle invariant: the block must lie inside
    /// the region rectangle it was captured from.
    #[must_use]
    pub fn bounds_within(&self, region_rect: &Rect) -> bool {
        region_rect.contains(&self.bounds)
    }
}

/// A `TextBlock` enriched with a translation and its provenance.
#[derive(Clone, Debug)]
pub struct TranslatedBlock {
    pub source: TextBlock,
    pub translated_text: String,
    pub translation_confidence: f32,
    pub translation_engine: String,
    pub source_of_translation: SourceOfTranslation,
}

impl TranslatedBlock {
    #[must_use]
    pub fn frame_id(&self) -> u64 {
        self.source.frame_id
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.source.bounds
    }
}
