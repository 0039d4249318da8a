use serde::{Deserialize, Serialize};

use crate::plugin::settings::SettingsSchema;

/// The kind of a plugin, as declared in its descriptor file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    Capture,
    Ocr,
    Translation,
    Optimizer,
    TextProcessor,
}

/// Which stage an optimizer attaches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageTarget {
    Capture,
    Preprocess,
    Ocr,
    Validate,
    Translate,
    Overlay,
    Pipeline,
}

impl std::fmt::Display for StageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Capture => "capture",
            Self::Preprocess => "preprocess",
            Self::Ocr => "ocr",
            Self::Validate => "validate",
            Self::Translate => "translate",
            Self::Overlay => "overlay",
            Self::Pipeline => "pipeline",
        };
        write!(f, "{s}")
    }
}

/// Where in a stage an optimizer hooks in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hook {
    Pre,
    Post,
    Global,
}

/// GPU/CPU runtime requirements declared by a plugin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeRequirements {
    #[serde(default)]
    pub gpu_required: bool,
    #[serde(default)]
    pub gpu_recommended: bool,
    #[serde(default)]
    pub gpu_libraries: Vec<String>,
    #[serde(default)]
    pub gpu_features: Vec<String>,
    #[serde(default)]
    pub cpu_supported: bool,
    #[serde(default)]
    pub cpu_fallback_plugin: Option<String>,
    /// Whether the plugin's `process` may be invoked concurrently from
    /// multiple worker threads. Defaults to false (serialized per instance).
    #[serde(default)]
    pub reentrant: bool,
}

/// Stable metadata declared by a plugin, parsed from its descriptor file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub kind: PluginKind,

    #[serde(default)]
    pub target_stage: Option<StageTarget>,
    #[serde(default)]
    pub hook: Option<Hook>,

    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub runtime_requirements: RuntimeRequirements,
    #[serde(default)]
    pub settings: SettingsSchema,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Reasons a descriptor fails validation; collected rather than
/// short-circuited so a caller can report every problem at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorIssue {
    MissingTargetStage,
    MissingHook,
    OptimizerTargetStageInvalid,
    EmptyName,
    EmptyVersion,
}

impl std::fmt::Display for DescriptorIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingTargetStage => "optimizer plugin missing target_stage",
            Self::MissingHook => "optimizer plugin missing hook",
            Self::OptimizerTargetStageInvalid => {
                "target_stage invalid for a non-pipeline optimizer hook"
            }
            Self::EmptyName => "name is empty",
            Self::EmptyVersion => "version is empty",
        };
        write!(f, "{s}")
    }
}

impl PluginDescriptor {
    /// Validates required fields per `PluginKind`, per §4.1: kind recognized
    /// (guaranteed by the type system here), target_stage/hook valid for
    /// optimizers, settings schema well-formed (schema parses, which serde
    /// already guarantees by the time we hold a `PluginDescriptor`).
    pub fn validate(&self) -> Vec<DescriptorIssue> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() {
            issues.push(DescriptorIssue::EmptyName);
        }
        if self.version.trim().is_empty() {
            issues.push(DescriptorIssue::EmptyVersion);
        }
        if self.kind == PluginKind::Optimizer {
            if self.target_stage.is_none() {
                issues.push(DescriptorIssue::MissingTargetStage);
            }
            if self.hook.is_none() {
                issues.push(DescriptorIssue::MissingHook);
            }
            if self.hook != Some(Hook::Global) && self.target_stage == Some(StageTarget::Pipeline)
            {
                issues.push(DescriptorIssue::OptimizerTargetStageInvalid);
            }
        }
        issues
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PluginDescriptor {
        PluginDescriptor {
            name: "frame_skip".to_string(),
            display_name: "Frame Skip".to_string(),
            version: "1.0.0".to_string(),
            kind: PluginKind::Optimizer,
            target_stage: Some(StageTarget::Capture),
            hook: Some(Hook::Post),
            dependencies: Vec::new(),
            runtime_requirements: RuntimeRequirements::default(),
            settings: SettingsSchema::default(),
            enabled: true,
        }
    }

    #[test]
    fn valid_optimizer_descriptor_passes() {
        assert!(base().is_valid());
    }

    #[test]
    fn optimizer_without_target_stage_fails() {
        let mut d = base();
        d.target_stage = None;
        assert!(d.validate().contains(&DescriptorIssue::MissingTargetStage));
    }

    #[test]
    fn optimizer_without_hook_fails() {
        let mut d = base();
        d.hook = None;
        assert!(d.validate().contains(&DescriptorIssue::MissingHook));
    }

    #[test]
    fn non_optimizer_kind_does_not_require_hook() {
        let mut d = base();
        d.kind = PluginKind::Capture;
        d.target_stage = None;
        d.hook = None;
        assert!(d.is_valid());
    }
}
