use std::collections::HashMap;
use std::sync::Arc;

use crate::dictionary::SmartDictionary;
use crate::error::CoreResult;
use crate::model::{LanguagePair, SourceOfTranslation, TranslatedBlock};
use crate::optimizers::translation_cache::TranslateInput;
use crate::stage::{Decision, PreHook, WorkItem};

/// Anything that can perform one direct translation hop. Implemented by
/// the Multi-Engine Router; kept as a trait here so this optimizer does
/// not depend on the router's concrete type.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, source: &str, target: &str) -> CoreResult<(String, f32)>;
}

/// Translate pre-hook (§4.5). Replaces a single translate call on a
/// configured pair with a sequence of hops through an intermediate
/// language, e.g. `"ja->de" => ["ja", "en", "de"]`.
pub struct TranslationChain {
    chains: HashMap<String, Vec<String>>,
    router: Arc<dyn Translator>,
    dictionary: Option<Arc<SmartDictionary>>,
}

impl TranslationChain {
    #[must_use]
    pub fn new(
        chains: HashMap<String, Vec<String>>,
        router: Arc<dyn Translator>,
        dictionary: Option<Arc<SmartDictionary>>,
    ) -> Self {
        Self { chains, router, dictionary }
    }
}

impl PreHook<TranslateInput, TranslatedBlock> for TranslationChain {
    fn name(&self) -> &str {
        "translation_chain"
    }

    fn apply(&self, item: &mut WorkItem<TranslateInput, TranslatedBlock>) -> Decision {
        let key = item.input.pair.as_key();
        let Some(hops) = self.chains.get(&key) else {
            return Decision::Continue;
        };
        if hops.len() < 2 {
            return Decision::Continue;
        }

        let mut text = item.input.block.text.clone();
        let mut final_confidence = 1.0f32;

        for window in hops.windows(2) {
            let (source, target) = (window[0].as_str(), window[1].as_str());
            let hop_source_text = text.clone();
            match self.router.translate(&hop_source_text, source, target) {
                Ok((translated, confidence)) => {
                    if let Some(dictionary) = &self.dictionary {
                        let hop_pair = LanguagePair::new(source, target);
                        if let Err(err) =
                            dictionary.learn(&hop_pair, &hop_source_text, &translated, confidence, "chain-step")
                        {
                            tracing::warn!(%err, "translation chain failed to learn hop");
                        }
                    }
                    text = translated;
                    final_confidence = final_confidence.min(confidence);
                }
                Err(err) => {
                    return Decision::Fail(format!(
                        "chain hop {source}->{target} failed: {err}"
                    ));
                }
            }
        }

        if let Some(dictionary) = &self.dictionary {
            if let Err(err) = dictionary.learn(
                &item.input.pair,
                &item.input.block.text,
                &text,
                final_confidence,
                "chain",
            ) {
                tracing::warn!(%err, "translation chain failed to learn final mapping");
            }
        }

        item.output = Some(TranslatedBlock {
            source: item.input.block.clone(),
            translated_text: text,
            translation_confidence: final_confidence,
            translation_engine: "chain".to_string(),
            source_of_translation: SourceOfTranslation::ChainFinal,
        });
        Decision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Rect, TextBlock};
    use std::sync::Mutex;

    struct StubRouter {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl Translator for StubRouter {
        fn translate(&self, text: &str, source: &str, target: &str) -> CoreResult<(String, f32)> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), source.to_string(), target.to_string()));
            Ok((format!("{text}@{target}"), 0.9))
        }
    }

    struct FailingRouter;
    impl Translator for FailingRouter {
        fn translate(&self, _text: &str, _source: &str, target: &str) -> CoreResult<(String, f32)> {
            Err(crate::error::CoreError::TransientEngine {
                engine: target.to_string(),
                reason: "down".to_string(),
            })
        }
    }

    fn block() -> TextBlock {
        TextBlock {
            frame_id: 1,
            bounds: Rect { x: 0, y: 0, w: 1, h: 1 },
            text: "hello".to_string(),
            confidence: 0.9,
            ocr_engine: "stub".into(),
        }
    }

    #[test]
    fn chains_through_intermediate_hop() {
        let mut chains = HashMap::new();
        chains.insert("ja->de".to_string(), vec!["ja".into(), "en".into(), "de".into()]);
        let router = Arc::new(StubRouter { calls: Mutex::new(vec![]) });
        let chain = TranslationChain::new(chains, router.clone(), None);

        let mut item = WorkItem::new(TranslateInput {
            block: block(),
            pair: LanguagePair::new("ja", "de"),
        });
        assert!(matches!(chain.apply(&mut item), Decision::Skip));
        let out = item.output.unwrap();
        assert_eq!(out.translated_text, "hello@en@de");
        assert_eq!(out.source_of_translation, SourceOfTranslation::ChainFinal);
        assert_eq!(router.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn unmapped_pair_is_passthrough() {
        let chain = TranslationChain::new(
            HashMap::new(),
            Arc::new(StubRouter { calls: Mutex::new(vec![]) }),
            None,
        );
        let mut item = WorkItem::new(TranslateInput {
            block: block(),
            pair: LanguagePair::new("en", "de"),
        });
        assert!(matches!(chain.apply(&mut item), Decision::Continue));
    }

    #[test]
    fn hop_failure_yields_fail_so_primary_runs_direct() {
        let mut chains = HashMap::new();
        chains.insert("ja->de".to_string(), vec!["ja".into(), "en".into(), "de".into()]);
        let chain = TranslationChain::new(chains, Arc::new(FailingRouter), None);
        let mut item = WorkItem::new(TranslateInput {
            block: block(),
            pair: LanguagePair::new("ja", "de"),
        });
        assert!(matches!(chain.apply(&mut item), Decision::Fail(_)));
    }
}
