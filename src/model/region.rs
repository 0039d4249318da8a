use serde::{Deserialize, Serialize};

/// Opaque small integer identifying a configured capture region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "region-{}", self.0)
    }
}

/// Axis-aligned rectangle in screen (or capture-coordinate) space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    #[must_use]
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.w as i32 <= self.x + self.w as i32
            && other.y + other.h as i32 <= self.y + self.h as i32
    }
}

/// A configured capture region: which monitor, which rectangle, and
/// optional per-region engine overrides for OCR/translation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub monitor: u32,
    pub rect: Rect,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ocr_engine_override: Option<String>,
    #[serde(default)]
    pub translation_engine_override: Option<String>,
    /// Per-region `"src->tgt"` override; falls back to
    /// `translation.language_pair` when absent.
    #[serde(default)]
    pub language_pair_override: Option<String>,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_true() -> bool {
    true
}

fn default_fps() -> u32 {
    10
}

impl Region {
    /// Validates the rectangle is non-degenerate and the fps is in the
    /// 1..=120 range required by the pipeline configuration contract.
    pub fn validate(&self) -> Result<(), crate::error::CoreError> {
        if self.rect.w == 0 || self.rect.h == 0 {
            return Err(crate::error::CoreError::configuration(format!(
                "region {} has a degenerate rectangle {}x{}",
                self.id, self.rect.w, self.rect.h
            )));
        }
        if !(1..=120).contains(&self.fps) {
            return Err(crate::error::CoreError::configuration(format!(
                "region {} fps {} out of range 1..=120",
                self.id, self.fps
            )));
        }
        Ok(())
    }
}
