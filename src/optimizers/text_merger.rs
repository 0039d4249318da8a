use crate::model::{Frame, Rect, TextBlock};
use crate::stage::{Decision, PostHook, WorkItem};

/// OCR post-hook (§4.5). Merges adjacent TextBlocks that belong to the
/// same line or paragraph, using configurable gap thresholds.
pub struct TextBlockMerger {
    horizontal_gap: u32,
    vertical_gap: u32,
    respect_punctuation: bool,
}

impl TextBlockMerger {
    #[must_use]
    pub fn new(horizontal_gap: u32, vertical_gap: u32, respect_punctuation: bool) -> Self {
        Self { horizontal_gap, vertical_gap, respect_punctuation }
    }

    fn adjacent(&self, a: &Rect, b: &Rect) -> bool {
        let vertical_overlap = (a.y - b.y).unsigned_abs() <= self.vertical_gap
            || ranges_overlap(a.y, a.h, b.y, b.h);
        let a_right = a.x + a.w as i32;
        let b_right = b.x + b.w as i32;
        let horizontal_close = if a_right <= b.x {
            (b.x - a_right) as u32 <= self.horizontal_gap
        } else if b_right <= a.x {
            (a.x - b_right) as u32 <= self.horizontal_gap
        } else {
            true
        };
        vertical_overlap && horizontal_close
    }

    fn ends_sentence(&self, text: &str) -> bool {
        self.respect_punctuation
            && text
                .trim_end()
                .chars()
                .next_back()
                .map(|c| matches!(c, '.' | '!' | '?'))
                .unwrap_or(false)
    }
}

fn ranges_overlap(a_start: i32, a_len: u32, b_start: i32, b_len: u32) -> bool {
    let a_end = a_start + a_len as i32;
    let b_end = b_start + b_len as i32;
    a_start < b_end && b_start < a_end
}

fn union(a: &Rect, b: &Rect) -> Rect {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let right = (a.x + a.w as i32).max(b.x + b.w as i32);
    let bottom = (a.y + a.h as i32).max(b.y + b.h as i32);
    Rect { x, y, w: (right - x) as u32, h: (bottom - y) as u32 }
}

impl PostHook<Frame, Vec<TextBlock>> for TextBlockMerger {
    fn name(&self) -> &str {
        "text_block_merger"
    }

    /// Idempotent by construction: after one pass, adjacent blocks have
    /// already been folded into one, so a second pass finds nothing left
    /// to merge.
    fn apply(&self, item: &mut WorkItem<Frame, Vec<TextBlock>>) -> Decision {
        let Some(blocks) = item.output.take() else {
            return Decision::Continue;
        };

        let mut merged: Vec<TextBlock> = Vec::with_capacity(blocks.len());
        for block in blocks {
            match merged.last_mut() {
                Some(prev) if self.adjacent(&prev.bounds, &block.bounds) && !self.ends_sentence(&prev.text) => {
                    prev.bounds = union(&prev.bounds, &block.bounds);
                    prev.text = format!("{} {}", prev.text, block.text);
                    prev.confidence = prev.confidence.min(block.confidence);
                }
                _ => merged.push(block),
            }
        }

        item.output = Some(merged);
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PixelFormat, RegionId};

    fn frame() -> Frame {
        Frame::new(0, RegionId(0), 0, vec![0; 4], 1, 1, PixelFormat::Rgba8)
    }

    fn block(text: &str, x: i32, y: i32, w: u32, h: u32) -> TextBlock {
        TextBlock {
            frame_id: 0,
            bounds: Rect { x, y, w, h },
            text: text.to_string(),
            confidence: 0.9,
            ocr_engine: "stub".into(),
        }
    }

    #[test]
    fn merges_adjacent_blocks_on_same_line() {
        let merger = TextBlockMerger::new(5, 2, false);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("Hello", 0, 0, 40, 10), block("world", 45, 0, 40, 10)]);
        merger.apply(&mut item);
        let out = item.output.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Hello world");
    }

    #[test]
    fn far_apart_blocks_stay_separate() {
        let merger = TextBlockMerger::new(5, 2, false);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("Hello", 0, 0, 40, 10), block("world", 200, 0, 40, 10)]);
        merger.apply(&mut item);
        assert_eq!(item.output.unwrap().len(), 2);
    }

    #[test]
    fn merge_pass_is_idempotent() {
        let merger = TextBlockMerger::new(5, 2, false);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("Hello", 0, 0, 40, 10), block("world", 45, 0, 40, 10)]);
        merger.apply(&mut item);
        let once = item.output.clone().unwrap();
        merger.apply(&mut item);
        let twice = item.output.unwrap();
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].text, twice[0].text);
    }

    #[test]
    fn respects_sentence_boundary() {
        let merger = TextBlockMerger::new(5, 2, true);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("Hello.", 0, 0, 40, 10), block("World", 45, 0, 40, 10)]);
        merger.apply(&mut item);
        assert_eq!(item.output.unwrap().len(), 2);
    }
}
