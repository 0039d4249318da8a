use std::time::Duration;

use thiserror::Error;

/// The error taxonomy surfaced by the pipeline runtime.
///
/// Hot-path errors (`StageItemError`, `HookError`, `TransientEngineError`,
/// `PersistentEngineError`, `CancelledError`) never escape the scheduler —
/// they are translated into counters and logs. Only lifecycle errors
/// (`ConfigurationError`, `PluginLoadError`, `PersistenceError`) and the
/// aggregate health snapshot are returned to callers.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("plugin load error for '{plugin}': {reason}")]
    PluginLoad { plugin: String, reason: String },

    #[error("stage item error in {stage}: {reason}")]
    StageItem { stage: String, reason: String },

    #[error("optimizer hook '{hook}' failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("transient engine error in '{engine}': {reason}")]
    TransientEngine { engine: String, reason: String },

    #[error("circuit breaker open for '{plugin}', cooling down for {remaining:?}")]
    PersistentEngine { plugin: String, remaining: Duration },

    #[error("dictionary persistence error for pair {pair}: {reason}")]
    Persistence { pair: String, reason: String },

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    #[must_use]
    pub fn plugin_load(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginLoad {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn stage_item(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageItem {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn hook(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error kind is hot-path (never propagated out of the
    /// scheduler) as opposed to a lifecycle error.
    #[must_use]
    pub fn is_hot_path(&self) -> bool {
        matches!(
            self,
            Self::StageItem { .. }
                | Self::Hook { .. }
                | Self::TransientEngine { .. }
                | Self::PersistentEngine { .. }
                | Self::Cancelled
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
