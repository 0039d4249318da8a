use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::CoreError;
use crate::health::CircuitBreaker;
use crate::model::LanguagePair;
use crate::optimizers::Translator;
use crate::plugin::{PluginInstance, TranslationPlugin};

/// Multi-Engine Translation Router (§4.6). Pure routing over loaded
/// translation plugins: maps a `LanguagePair` to the plugin that should
/// handle it, falling back to a configured default, then to the first
/// plugin by name order. Does not cache, learn, or chain — those are
/// layered optimizers (`TranslationCache`, `TranslationChain`).
///
/// Holds one `CircuitBreaker` per registered engine name (§4.7): a
/// failing engine is isolated without disabling routing to the others.
pub struct TranslationRouter {
    engines: Mutex<HashMap<String, Arc<PluginInstance<dyn TranslationPlugin>>>>,
    mapping: Mutex<HashMap<String, String>>,
    default: Mutex<Option<String>>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    failure_threshold: u32,
    cool_down: Duration,
    clock: SharedClock,
}

impl TranslationRouter {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self::with_breaker_config(clock, 5, Duration::from_secs(10))
    }

    #[must_use]
    pub fn with_breaker_config(clock: SharedClock, failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            mapping: Mutex::new(HashMap::new()),
            default: Mutex::new(None),
            breakers: Mutex::new(HashMap::new()),
            failure_threshold,
            cool_down,
            clock,
        }
    }

    pub fn register(&self, name: impl Into<String>, plugin: Arc<PluginInstance<dyn TranslationPlugin>>) {
        let name = name.into();
        self.with_breaker(&name, |_| Ok(())).expect("breaker init never fails");
        self.engines.lock().expect("router lock poisoned").insert(name, plugin);
    }

    /// Atomically replaces the engine registered under `name` (§4.1
    /// hot-reload contract, invariant 10 of §8): `translate_with_engine`
    /// clones the engine `Arc` out from under the same lock before use, so
    /// an in-flight call already holds the old instance and a call
    /// entering after this returns observes the new one. Its breaker state
    /// is preserved across the swap.
    pub fn reload(&self, name: impl Into<String>, plugin: Arc<PluginInstance<dyn TranslationPlugin>>) {
        self.engines.lock().expect("router lock poisoned").insert(name.into(), plugin);
    }

    /// Snapshot of every registered engine's circuit breaker state, for
    /// `Pipeline::health()`.
    #[must_use]
    pub fn breaker_states(&self) -> HashMap<String, &'static str> {
        self.breakers
            .lock()
            .expect("router breaker lock poisoned")
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state_label()))
            .collect()
    }

    pub fn map_pair(&self, pair: &LanguagePair, plugin_name: impl Into<String>) {
        self.mapping
            .lock()
            .expect("router lock poisoned")
            .insert(pair.as_key(), plugin_name.into());
    }

    pub fn set_default(&self, plugin_name: impl Into<String>) {
        *self.default.lock().expect("router lock poisoned") = Some(plugin_name.into());
    }

    fn resolve_name(&self, pair: &LanguagePair) -> Option<String> {
        let mapping = self.mapping.lock().expect("router lock poisoned");
        if let Some(name) = mapping.get(&pair.as_key()) {
            return Some(name.clone());
        }
        drop(mapping);

        if let Some(name) = self.default.lock().expect("router lock poisoned").clone() {
            return Some(name);
        }

        let engines = self.engines.lock().expect("router lock poisoned");
        let mut names: Vec<&String> = engines.keys().collect();
        names.sort();
        names.first().map(|n| n.to_string())
    }

    /// Routes a single translate call. Falls back to the configured
    /// default (if different from the first attempt) on failure before
    /// giving up.
    pub fn translate(&self, text: &str, pair: &LanguagePair) -> Result<(String, f32), CoreError> {
        self.translate_with_engine(text, pair).map(|(t, c, _)| (t, c))
    }

    /// Same as `translate`, but also reports which engine name actually
    /// produced the result (the primary, or the default on fallback).
    pub fn translate_with_engine(
        &self,
        text: &str,
        pair: &LanguagePair,
    ) -> Result<(String, f32, String), CoreError> {
        let primary = self.resolve_name(pair).ok_or_else(|| CoreError::TransientEngine {
            engine: "router".to_string(),
            reason: "no translation plugin registered".to_string(),
        })?;

        match self.call(&primary, text, pair) {
            Ok((t, c)) => Ok((t, c, primary)),
            Err(primary_err) => {
                let default = self.default.lock().expect("router lock poisoned").clone();
                match default {
                    Some(name) if name != primary => {
                        tracing::warn!(engine = %primary, error = %primary_err, "translation engine failed, falling back to default");
                        self.call(&name, text, pair).map(|(t, c)| (t, c, name))
                    }
                    _ => Err(primary_err),
                }
            }
        }
    }

    fn call(&self, name: &str, text: &str, pair: &LanguagePair) -> Result<(String, f32), CoreError> {
        self.with_breaker(name, |breaker| breaker.allow())?;

        let instance = {
            let engines = self.engines.lock().expect("router lock poisoned");
            engines
                .get(name)
                .cloned()
                .ok_or_else(|| CoreError::TransientEngine {
                    engine: name.to_string(),
                    reason: "plugin not registered".to_string(),
                })?
        };
        if !instance.state().can_receive_work() {
            self.with_breaker(name, |breaker| {
                breaker.record_failure();
                Ok(())
            })?;
            return Err(CoreError::TransientEngine {
                engine: name.to_string(),
                reason: format!("plugin not running ({:?})", instance.state()),
            });
        }
        let result = {
            let mut handle = instance.handle.lock().expect("plugin handle lock poisoned");
            handle
                .translate(text, pair.source(), pair.target())
                .map_err(|e| CoreError::TransientEngine {
                    engine: name.to_string(),
                    reason: e.to_string(),
                })
        };
        self.with_breaker(name, |breaker| {
            match &result {
                Ok(_) => breaker.record_success(),
                Err(_) => breaker.record_failure(),
            }
            Ok(())
        })?;
        result
    }

    fn with_breaker<T>(
        &self,
        name: &str,
        f: impl FnOnce(&CircuitBreaker) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut breakers = self.breakers.lock().expect("router breaker lock poisoned");
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            CircuitBreaker::new(name, self.failure_threshold, self.cool_down, self.clock.clone())
        });
        f(breaker)
    }
}

impl Translator for TranslationRouter {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<(String, f32), CoreError> {
        TranslationRouter::translate(self, text, &LanguagePair::new(source, target))
    }
}
