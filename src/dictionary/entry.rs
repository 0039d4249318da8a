use serde::{Deserialize, Serialize};

use crate::clock::MonotonicTimestamp;

/// A learned translation for one canonicalized source text within a
/// `LanguagePair`. At most one entry exists per (pair, canonicalized
/// source_text).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub source_text: String,
    pub translation: String,
    pub confidence: f32,
    pub use_count: u64,
    pub created_at: MonotonicTimestamp,
    pub last_used_at: MonotonicTimestamp,
    pub source_engine: String,
}

impl DictionaryEntry {
    #[must_use]
    pub fn new(
        source_text: String,
        translation: String,
        confidence: f32,
        source_engine: String,
        now: MonotonicTimestamp,
    ) -> Self {
        Self {
            source_text,
            translation,
            confidence,
            use_count: 1,
            created_at: now,
            last_used_at: now,
            source_engine,
        }
    }

    pub fn mark_used(&mut self, now: MonotonicTimestamp) {
        self.use_count = self.use_count.saturating_add(1);
        self.last_used_at = now;
    }
}
