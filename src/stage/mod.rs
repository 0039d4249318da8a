pub mod engine;
pub mod metrics;

pub use engine::{Decision, PostHook, PreHook, Primary, StageEngine, WorkItem};
pub use metrics::StageMetrics;
