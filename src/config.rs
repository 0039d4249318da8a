use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::dictionary::MaxEntries;
use crate::error::CoreError;
use crate::model::{LanguagePair, Region, RegionId};
use crate::scheduler::SchedulerMode;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub plugins: PluginsSection,
    #[serde(default)]
    pub translation: TranslationSection,
    #[serde(default)]
    pub dictionary: DictionarySection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_stop_deadline_ms")]
    pub stop_deadline_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            queue_size: default_queue_size(),
            stop_deadline_ms: default_stop_deadline_ms(),
        }
    }
}

fn default_mode() -> String {
    "sequential".to_string()
}

fn default_queue_size() -> usize {
    10
}

fn default_stop_deadline_ms() -> u64 {
    5_000
}

/// `plugins.<stage>.<name>.{enabled, settings.*}`, keyed first by stage
/// name then by plugin name, a nested-table TOML layout that keeps each
/// plugin's settings namespaced under its own stage and name.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(transparent)]
pub struct PluginsSection(pub HashMap<String, HashMap<String, PluginConfig>>);

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PluginConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: HashMap<String, toml::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TranslationSection {
    #[serde(default)]
    pub engine_mapping: HashMap<String, String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub chains: HashMap<String, Vec<String>>,
    /// Pipeline-wide `"src->tgt"` pair, used for any region without a
    /// `language_pair_override`.
    #[serde(default)]
    pub language_pair: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DictionarySection {
    #[serde(default = "default_true")]
    pub auto_learn: bool,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_autosave_every_n_learns")]
    pub autosave_every_n_learns: usize,
    #[serde(default = "default_max_entries")]
    pub max_entries: MaxEntriesConfig,
}

impl Default for DictionarySection {
    fn default() -> Self {
        Self {
            auto_learn: true,
            min_confidence: default_min_confidence(),
            autosave_every_n_learns: default_autosave_every_n_learns(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_min_confidence() -> f32 {
    0.85
}

fn default_autosave_every_n_learns() -> usize {
    100
}

fn default_max_entries() -> MaxEntriesConfig {
    MaxEntriesConfig::Unlimited
}

/// `dictionary.max_entries`: either an integer bound or the literal
/// string `"unlimited"` (§9 open question 3).
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum MaxEntriesConfig {
    Bounded(usize),
    Literal(String),
}

impl MaxEntriesConfig {
    fn resolve(&self, plugin_context: &str) -> Result<MaxEntries, CoreError> {
        match self {
            Self::Bounded(n) => Ok(MaxEntries::Bounded(*n)),
            Self::Literal(s) if s == "unlimited" => Ok(MaxEntries::Unlimited),
            Self::Literal(other) => Err(CoreError::configuration(format!(
                "{plugin_context}: dictionary.max_entries must be an integer or \"unlimited\", got {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub mode: SchedulerMode,
    pub queue_size: usize,
    pub stop_deadline_ms: u64,
    pub regions: Vec<Region>,
    pub plugins: PluginsSection,
    pub translation_mapping: HashMap<LanguagePair, String>,
    pub translation_default: Option<String>,
    pub translation_chains: HashMap<String, Vec<String>>,
    /// Resolved `"src->tgt"` pair for every enabled region: per-region
    /// override if set, otherwise `translation.language_pair`.
    pub region_language_pairs: HashMap<RegionId, LanguagePair>,
    pub dictionary_auto_learn: bool,
    pub dictionary_min_confidence: f32,
    pub dictionary_autosave_every_n_learns: usize,
    pub dictionary_max_entries: MaxEntries,
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Validates and resolves a raw `AppConfig` into a `RuntimeConfig`,
/// rejecting anything out of the ranges normative in §6.
pub fn resolve(cfg: &AppConfig) -> Result<RuntimeConfig, CoreError> {
    let mode = match cfg.pipeline.mode.as_str() {
        "sequential" => SchedulerMode::Sequential,
        "async" => SchedulerMode::Async,
        other => {
            return Err(CoreError::configuration(format!(
                "pipeline.mode must be \"sequential\" or \"async\", got {other:?}"
            )))
        }
    };

    if mode == SchedulerMode::Async && !(1..=64).contains(&cfg.pipeline.queue_size) {
        return Err(CoreError::configuration(format!(
            "pipeline.queue_size {} out of range 1..=64",
            cfg.pipeline.queue_size
        )));
    }

    for region in &cfg.regions {
        region.validate()?;
    }

    let mut translation_mapping = HashMap::new();
    for (key, plugin) in &cfg.translation.engine_mapping {
        let pair = LanguagePair::parse(key).ok_or_else(|| {
            CoreError::configuration(format!(
                "translation.engine_mapping key {key:?} is not a valid \"src->tgt\" pair"
            ))
        })?;
        translation_mapping.insert(pair, plugin.clone());
    }

    let mut region_language_pairs = HashMap::new();
    for region in &cfg.regions {
        let raw = region
            .language_pair_override
            .as_deref()
            .or_else(|| cfg.translation.language_pair.as_deref());
        let Some(raw) = raw else {
            return Err(CoreError::configuration(format!(
                "region {} has no language_pair_override and translation.language_pair is unset",
                region.id
            )));
        };
        let pair = LanguagePair::parse(raw).ok_or_else(|| {
            CoreError::configuration(format!(
                "region {} language pair {raw:?} is not a valid \"src->tgt\" pair",
                region.id
            ))
        })?;
        region_language_pairs.insert(region.id, pair);
    }

    Ok(RuntimeConfig {
        mode,
        queue_size: cfg.pipeline.queue_size,
        stop_deadline_ms: cfg.pipeline.stop_deadline_ms,
        regions: cfg.regions.clone(),
        plugins: cfg.plugins.clone(),
        translation_mapping,
        translation_default: cfg.translation.default.clone(),
        translation_chains: cfg.translation.chains.clone(),
        region_language_pairs,
        dictionary_auto_learn: cfg.dictionary.auto_learn,
        dictionary_min_confidence: cfg.dictionary.min_confidence,
        dictionary_autosave_every_n_learns: cfg.dictionary.autosave_every_n_learns,
        dictionary_max_entries: cfg.dictionary.max_entries.resolve("dictionary.max_entries")?,
    })
}
