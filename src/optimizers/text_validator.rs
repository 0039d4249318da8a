use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dictionary::SmartDictionary;
use crate::model::{Frame, LanguagePair, TextBlock};
use crate::stage::{Decision, PostHook, WorkItem};

static GARBAGE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]{3,}").expect("valid regex"));
static OCR_BAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|").expect("valid regex"));
static DIGIT_AMONG_LETTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<lead>\p{L})0(?P<trail>\p{L})").expect("valid regex"));

#[derive(Default)]
pub struct TextValidatorStats {
    pub processed: AtomicU64,
    pub repaired: AtomicU64,
    pub dropped: AtomicU64,
}

/// OCR post-hook (§4.5), also called "Intelligent Text Processor" in the
/// original design notes. Repairs common OCR confusions and recomputes a
/// confidence score; blocks scoring below `min_confidence` are dropped.
pub struct TextValidator {
    min_confidence: f32,
    /// Dictionary and the pair to probe it under, for the dictionary-hit
    /// confidence signal. Validate runs before a translation pair is
    /// chosen for the item, so this is the region's *configured* source
    /// language paired against every dictionary target, not a per-item
    /// pair; absent when no dictionary-hit signal is wanted.
    dictionary: Option<(Arc<SmartDictionary>, LanguagePair)>,
    stats: TextValidatorStats,
}

impl TextValidator {
    #[must_use]
    pub fn new(min_confidence: f32, dictionary: Option<(Arc<SmartDictionary>, LanguagePair)>) -> Self {
        Self {
            min_confidence,
            dictionary,
            stats: TextValidatorStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.processed.load(Ordering::Relaxed),
            self.stats.repaired.load(Ordering::Relaxed),
            self.stats.dropped.load(Ordering::Relaxed),
        )
    }

    fn repair(&self, text: &str) -> (String, bool) {
        let mut repaired = false;
        let mut out = text.to_string();
        if OCR_BAR_TOKEN.is_match(&out) {
            out = OCR_BAR_TOKEN.replace_all(&out, "I").into_owned();
            repaired = true;
        }
        if DIGIT_AMONG_LETTERS.is_match(&out) {
            out = DIGIT_AMONG_LETTERS
                .replace_all(&out, "${lead}O${trail}")
                .into_owned();
            repaired = true;
        }
        (out, repaired)
    }

    fn score(&self, text: &str, ocr_confidence: f32) -> f32 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let common_word_ratio = if tokens.is_empty() {
            0.0
        } else {
            tokens
                .iter()
                .filter(|t| t.chars().all(|c| c.is_alphabetic()))
                .count() as f32
                / tokens.len() as f32
        };

        let dictionary_hit_ratio = self
            .dictionary
            .as_ref()
            .and_then(|(dict, pair)| dict.lookup(pair, text).ok().flatten())
            .map(|_| 1.0)
            .unwrap_or(0.0);

        let has_capital = text.chars().next().map(char::is_uppercase).unwrap_or(false);
        let ends_with_punctuation = text
            .trim_end()
            .chars()
            .next_back()
            .map(|c| matches!(c, '.' | '!' | '?'))
            .unwrap_or(false);
        let punctuation_signal = if has_capital || ends_with_punctuation { 1.0 } else { 0.5 };

        let garbage_penalty = if GARBAGE_RUN.is_match(text) { 0.5 } else { 1.0 };

        let combined = 0.4 * ocr_confidence
            + 0.25 * common_word_ratio
            + 0.1 * dictionary_hit_ratio
            + 0.1 * punctuation_signal
            + 0.15 * garbage_penalty;
        combined.clamp(0.0, 1.0)
    }
}

impl PostHook<Frame, Vec<TextBlock>> for TextValidator {
    fn name(&self) -> &str {
        "text_validator"
    }

    fn apply(&self, item: &mut WorkItem<Frame, Vec<TextBlock>>) -> Decision {
        let Some(blocks) = item.output.take() else {
            return Decision::Continue;
        };

        let mut kept = Vec::with_capacity(blocks.len());
        for mut block in blocks {
            self.stats.processed.fetch_add(1, Ordering::Relaxed);
            let (repaired_text, was_repaired) = self.repair(&block.text);
            if was_repaired {
                self.stats.repaired.fetch_add(1, Ordering::Relaxed);
            }
            let score = self.score(&repaired_text, block.confidence);
            block.text = repaired_text;
            block.confidence = score;

            if score < self.min_confidence {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            kept.push(block);
        }

        item.output = Some(kept);
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PixelFormat, Rect, RegionId};

    fn frame() -> Frame {
        Frame::new(0, RegionId(0), 0, vec![0; 4], 1, 1, PixelFormat::Rgba8)
    }

    fn block(text: &str, confidence: f32) -> TextBlock {
        TextBlock {
            frame_id: 0,
            bounds: Rect { x: 0, y: 0, w: 1, h: 1 },
            text: text.to_string(),
            confidence,
            ocr_engine: "stub".into(),
        }
    }

    #[test]
    fn repairs_bar_to_capital_i() {
        let validator = TextValidator::new(0.0, None);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("Hello |t is me", 0.9)]);
        validator.apply(&mut item);
        let out = item.output.unwrap();
        assert_eq!(out[0].text, "Hello It is me");
    }

    #[test]
    fn low_confidence_garbage_is_dropped() {
        let validator = TextValidator::new(0.5, None);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("%$#@!^&*", 0.1)]);
        validator.apply(&mut item);
        assert!(item.output.unwrap().is_empty());
    }

    #[test]
    fn clean_high_confidence_text_survives() {
        let validator = TextValidator::new(0.3, None);
        let mut item = WorkItem::new(frame());
        item.output = Some(vec![block("Hello world.", 0.95)]);
        validator.apply(&mut item);
        assert_eq!(item.output.unwrap().len(), 1);
    }
}
