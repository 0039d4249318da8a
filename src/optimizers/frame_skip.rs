use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::model::{Fingerprint, Frame, Rect, Region, RegionId};
use crate::stage::{Decision, PostHook, WorkItem};

/// What the Overlay shows downstream of a skipped frame (§9 open question
/// 1): either it keeps drawing the previous frame's translated blocks, or
/// it draws nothing until the next admitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSkipOnSkip {
    ReusePrevious,
    DrawNothing,
}

impl Default for FrameSkipOnSkip {
    fn default() -> Self {
        Self::ReusePrevious
    }
}

/// How two frames' fingerprints are compared for similarity.
#[derive(Clone, Copy, Debug)]
pub enum SimilarityMode {
    FastHash,
    PerceptualHash { max_hamming_distance: u32 },
    MeanSquaredError { max_mse: f64 },
}

/// The Capture stage's primary input: which region was sampled and under
/// what frame_id, so Frame Skip can detect region reconfiguration.
#[derive(Clone)]
pub struct CaptureInput {
    pub region: Region,
    pub frame_id: u64,
}

struct RegionSkipState {
    last_admitted: Option<Frame>,
    last_rect: Rect,
    similar_streak: u32,
    consecutive_skips: u32,
}

#[derive(Default)]
pub struct FrameSkipStats {
    pub admitted: AtomicU64,
    pub skipped: AtomicU64,
}

/// Capture post-hook (§4.5). Skips downstream work for frames that are not
/// meaningfully different from the last *admitted* frame of their region.
pub struct FrameSkip {
    mode: SimilarityMode,
    min_skip_frames: u32,
    max_consecutive_skips: u32,
    on_skip: FrameSkipOnSkip,
    state: Mutex<HashMap<RegionId, RegionSkipState>>,
    stats: FrameSkipStats,
}

impl FrameSkip {
    #[must_use]
    pub fn new(mode: SimilarityMode, min_skip_frames: u32, max_consecutive_skips: u32) -> Self {
        Self {
            mode,
            min_skip_frames: min_skip_frames.max(1),
            max_consecutive_skips,
            on_skip: FrameSkipOnSkip::default(),
            state: Mutex::new(HashMap::new()),
            stats: FrameSkipStats::default(),
        }
    }

    #[must_use]
    pub fn with_on_skip(mut self, on_skip: FrameSkipOnSkip) -> Self {
        self.on_skip = on_skip;
        self
    }

    #[must_use]
    pub fn on_skip(&self) -> FrameSkipOnSkip {
        self.on_skip
    }

    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.admitted.load(Ordering::Relaxed),
            self.stats.skipped.load(Ordering::Relaxed),
        )
    }

    fn is_similar(&self, a: &Frame, b: &Frame) -> bool {
        match self.mode {
            SimilarityMode::FastHash => a.fingerprint == b.fingerprint,
            SimilarityMode::PerceptualHash { max_hamming_distance } => {
                a.fingerprint.hamming_distance(&b.fingerprint) <= max_hamming_distance
            }
            SimilarityMode::MeanSquaredError { max_mse } => mean_squared_error(a, b) <= max_mse,
        }
    }
}

fn mean_squared_error(a: &Frame, b: &Frame) -> f64 {
    if a.pixels.len() != b.pixels.len() || a.pixels.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = a
        .pixels
        .iter()
        .zip(b.pixels.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum();
    sum / a.pixels.len() as f64
}

impl PostHook<CaptureInput, Frame> for FrameSkip {
    fn name(&self) -> &str {
        "frame_skip"
    }

    fn apply(&self, item: &mut WorkItem<CaptureInput, Frame>) -> Decision {
        let Some(out) = &item.output else {
            return Decision::Continue;
        };
        let frame = out.clone();
        let region_id = frame.region_id;
        let rect = item.input.region.rect;

        let mut state = self.state.lock().expect("frame skip lock poisoned");
        let entry = state.entry(region_id).or_insert_with(|| RegionSkipState {
            last_admitted: None,
            last_rect: rect,
            similar_streak: 0,
            consecutive_skips: 0,
        });

        let region_changed = entry.last_rect != rect;
        if region_changed {
            entry.last_rect = rect;
            entry.similar_streak = 0;
            entry.consecutive_skips = 0;
            entry.last_admitted = Some(frame);
            self.stats.admitted.fetch_add(1, Ordering::Relaxed);
            return Decision::Continue;
        }

        let similar = entry
            .last_admitted
            .as_ref()
            .map(|prev| self.is_similar(prev, &frame))
            .unwrap_or(false);

        if similar {
            entry.similar_streak += 1;
        } else {
            entry.similar_streak = 0;
        }

        // Invariant: never skip more than `max_consecutive_skips` frames in
        // a row for a region, regardless of similarity streak length.
        if entry.similar_streak >= self.min_skip_frames
            && entry.consecutive_skips < self.max_consecutive_skips
        {
            entry.consecutive_skips += 1;
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            Decision::Skip
        } else {
            entry.consecutive_skips = 0;
            entry.last_admitted = Some(frame);
            self.stats.admitted.fetch_add(1, Ordering::Relaxed);
            Decision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PixelFormat;

    fn region(rect: Rect) -> Region {
        Region {
            id: RegionId(1),
            monitor: 0,
            rect,
            display_name: "r".into(),
            enabled: true,
            ocr_engine_override: None,
            translation_engine_override: None,
            language_pair_override: None,
            fps: 10,
        }
    }

    fn frame(pixels: &[u8]) -> Frame {
        Frame::new(0, RegionId(1), 0, pixels.to_vec(), 1, 1, PixelFormat::Rgba8)
    }

    fn item(rect: Rect, pixels: &[u8]) -> WorkItem<CaptureInput, Frame> {
        let mut item = WorkItem::new(CaptureInput {
            region: region(rect),
            frame_id: 0,
        });
        item.output = Some(frame(pixels));
        item
    }

    #[test]
    fn first_frame_is_always_admitted() {
        let skip = FrameSkip::new(SimilarityMode::FastHash, 1, 30);
        let rect = Rect { x: 0, y: 0, w: 10, h: 10 };
        let mut it = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut it), Decision::Continue));
    }

    #[test]
    fn identical_frames_skip_after_min_streak() {
        let skip = FrameSkip::new(SimilarityMode::FastHash, 1, 30);
        let rect = Rect { x: 0, y: 0, w: 10, h: 10 };
        let mut first = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut first), Decision::Continue));
        let mut second = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut second), Decision::Skip));
    }

    #[test]
    fn never_skips_more_than_max_consecutive() {
        let skip = FrameSkip::new(SimilarityMode::FastHash, 1, 2);
        let rect = Rect { x: 0, y: 0, w: 10, h: 10 };

        let mut warm = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut warm), Decision::Continue));

        let mut first_skip = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut first_skip), Decision::Skip));
        let mut second_skip = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut second_skip), Decision::Skip));

        // max_consecutive_skips == 2: the third identical frame in a row
        // must be force-admitted.
        let mut third = item(rect, b"aaaa");
        assert!(matches!(skip.apply(&mut third), Decision::Continue));
    }

    #[test]
    fn region_change_forces_admit() {
        let skip = FrameSkip::new(SimilarityMode::FastHash, 1, 30);
        let rect_a = Rect { x: 0, y: 0, w: 10, h: 10 };
        let rect_b = Rect { x: 0, y: 0, w: 20, h: 10 };
        let mut first = item(rect_a, b"aaaa");
        skip.apply(&mut first);
        let mut second = item(rect_a, b"aaaa");
        assert!(matches!(skip.apply(&mut second), Decision::Skip));
        let mut changed = item(rect_b, b"aaaa");
        assert!(matches!(skip.apply(&mut changed), Decision::Continue));
    }
}
