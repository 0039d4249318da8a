pub mod descriptor;
pub mod instance;
pub mod registry;
pub mod settings;
pub mod traits;

pub use descriptor::{Hook, PluginDescriptor, PluginKind, RuntimeRequirements, StageTarget};
pub use instance::{LifecycleState, PluginInstance};
pub use registry::{HotSwap, PluginRegistry, TypedRegistry};
pub use settings::{SettingSpec, SettingType, SettingValue, SettingsSchema};
pub use traits::{
    CapturePlugin, OcrPlugin, OverlayRenderer, PreprocessPlugin, Settings, TranslationPlugin,
    ValidatePlugin,
};
