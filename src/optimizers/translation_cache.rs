use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::dictionary::SmartDictionary;
use crate::model::{LanguagePair, SourceOfTranslation, TextBlock, TranslatedBlock};
use crate::stage::{Decision, PostHook, PreHook, WorkItem};

/// The Translate stage's primary input: the block to translate and the
/// language pair to translate it under.
#[derive(Clone)]
pub struct TranslateInput {
    pub block: TextBlock,
    pub pair: LanguagePair,
}

#[derive(Clone)]
struct CachedTranslation {
    text: String,
    confidence: f32,
    engine: String,
}

#[derive(Default)]
pub struct TranslationCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

/// Translate pre-hook and post-hook pair (§4.5): a bounded LRU of
/// `(pair, source_text) -> translation` in front of the Smart Dictionary.
/// On hit, short-circuits the primary; on a genuine primary translation,
/// the post-hook half learns the result back into the cache and (subject
/// to the dictionary's own confidence threshold) into the dictionary.
pub struct TranslationCache {
    cache: Mutex<LruCache<(String, String), CachedTranslation>>,
    dictionary: Option<Arc<SmartDictionary>>,
    stats: TranslationCacheStats,
}

impl TranslationCache {
    #[must_use]
    pub fn new(capacity: usize, dictionary: Option<Arc<SmartDictionary>>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("max(1) is nonzero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            dictionary,
            stats: TranslationCacheStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
        )
    }

    fn key(pair: &LanguagePair, text: &str) -> (String, String) {
        (pair.as_key(), text.to_string())
    }
}

impl PreHook<TranslateInput, TranslatedBlock> for TranslationCache {
    fn name(&self) -> &str {
        "translation_cache"
    }

    fn apply(&self, item: &mut WorkItem<TranslateInput, TranslatedBlock>) -> Decision {
        let key = Self::key(&item.input.pair, &item.input.block.text);
        let mut cache = self.cache.lock().expect("translation cache lock poisoned");
        match cache.get(&key) {
            Some(hit) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                item.output = Some(TranslatedBlock {
                    source: item.input.block.clone(),
                    translated_text: hit.text.clone(),
                    translation_confidence: hit.confidence,
                    translation_engine: hit.engine.clone(),
                    source_of_translation: SourceOfTranslation::Cache,
                });
                Decision::Skip
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Decision::Continue
            }
        }
    }
}

impl PostHook<TranslateInput, TranslatedBlock> for TranslationCache {
    fn name(&self) -> &str {
        "translation_cache"
    }

    fn apply(&self, item: &mut WorkItem<TranslateInput, TranslatedBlock>) -> Decision {
        let Some(out) = &item.output else {
            return Decision::Continue;
        };
        // Only genuine engine output needs learning; a cache hit is
        // already in the cache by definition.
        if out.source_of_translation != SourceOfTranslation::Engine {
            return Decision::Continue;
        }
        let key = Self::key(&item.input.pair, &item.input.block.text);
        let cached = CachedTranslation {
            text: out.translated_text.clone(),
            confidence: out.translation_confidence,
            engine: out.translation_engine.clone(),
        };
        self.cache
            .lock()
            .expect("translation cache lock poisoned")
            .put(key, cached);

        if let Some(dictionary) = &self.dictionary {
            if let Err(err) = dictionary.learn(
                &item.input.pair,
                &item.input.block.text,
                &out.translated_text,
                out.translation_confidence,
                &out.translation_engine,
            ) {
                tracing::warn!(%err, "translation cache failed to learn into dictionary");
            }
        }
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;

    fn block(text: &str) -> TextBlock {
        TextBlock {
            frame_id: 1,
            bounds: Rect { x: 0, y: 0, w: 1, h: 1 },
            text: text.to_string(),
            confidence: 0.95,
            ocr_engine: "stub".into(),
        }
    }

    fn engine_output(block: &TextBlock, text: &str) -> TranslatedBlock {
        TranslatedBlock {
            source: block.clone(),
            translated_text: text.to_string(),
            translation_confidence: 0.95,
            translation_engine: "stub".into(),
            source_of_translation: SourceOfTranslation::Engine,
        }
    }

    #[test]
    fn miss_then_learn_then_hit() {
        let cache = TranslationCache::new(16, None);
        let pair = LanguagePair::new("en", "de");
        let block = block("Hello");

        let mut item = WorkItem::new(TranslateInput { block: block.clone(), pair: pair.clone() });
        assert!(matches!(
            PreHook::apply(&cache, &mut item),
            Decision::Continue
        ));
        item.output = Some(engine_output(&block, "Hallo"));
        PostHook::apply(&cache, &mut item);

        let mut second = WorkItem::new(TranslateInput { block, pair });
        assert!(matches!(
            PreHook::apply(&cache, &mut second),
            Decision::Skip
        ));
        assert_eq!(second.output.unwrap().translated_text, "Hallo");
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn cache_hit_is_not_relearned() {
        let cache = TranslationCache::new(16, None);
        let pair = LanguagePair::new("en", "de");
        let block = block("Hello");
        let mut item = WorkItem::new(TranslateInput { block: block.clone(), pair });
        item.output = Some(TranslatedBlock {
            source: block,
            translated_text: "Hallo".into(),
            translation_confidence: 0.95,
            translation_engine: "cache".into(),
            source_of_translation: SourceOfTranslation::Cache,
        });
        // Post-hook on a cache-sourced item must be a no-op (Continue,
        // no duplicate `put`).
        assert!(matches!(PostHook::apply(&cache, &mut item), Decision::Continue));
    }
}
