use std::sync::Arc;
use std::time::Instant;

use crate::stage::metrics::StageMetrics;

/// The outcome of an optimizer hook, per §4.5: `continue` is normal flow,
/// `skip` means "do not invoke primary, jump to post-hooks" for pre-hooks
/// (and "drop this item without emitting" for post-hooks), `fail` is a
/// non-fatal hook failure — the item proceeds with its pre-failure state.
pub enum Decision {
    Continue,
    Skip,
    Fail(String),
}

/// The unit of work flowing through one stage: the primary's input, and
/// (once set, either by a short-circuiting pre-hook or by the primary
/// itself) its output.
pub struct WorkItem<In, Out> {
    pub input: In,
    pub output: Option<Out>,
}

impl<In, Out> WorkItem<In, Out> {
    #[must_use]
    pub fn new(input: In) -> Self {
        Self { input, output: None }
    }
}

/// The single active primary plugin of a stage, invoked if no pre-hook
/// short-circuits the item.
pub trait Primary<In, Out>: Send + Sync {
    fn invoke(&self, input: &In) -> Result<Out, String>;
}

pub trait PreHook<In, Out>: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, item: &mut WorkItem<In, Out>) -> Decision;
}

pub trait PostHook<In, Out>: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, item: &mut WorkItem<In, Out>) -> Decision;
}

/// Wraps one primary plugin plus its ordered pre/post optimizer hooks,
/// per §4.2. `process` runs the full pre-hooks -> primary -> post-hooks
/// sequence for one item and returns `Some(Out)` to emit downstream, or
/// `None` if the item was dropped (primary failure) or discarded by a
/// post-hook.
pub struct StageEngine<In, Out> {
    pub name: String,
    primary: Arc<dyn Primary<In, Out>>,
    pre_hooks: Vec<Arc<dyn PreHook<In, Out>>>,
    post_hooks: Vec<Arc<dyn PostHook<In, Out>>>,
    pub metrics: StageMetrics,
    clock: crate::clock::SharedClock,
}

impl<In, Out> StageEngine<In, Out> {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn Primary<In, Out>>,
        pre_hooks: Vec<Arc<dyn PreHook<In, Out>>>,
        post_hooks: Vec<Arc<dyn PostHook<In, Out>>>,
        clock: crate::clock::SharedClock,
    ) -> Self {
        Self {
            name: name.into(),
            primary,
            pre_hooks,
            post_hooks,
            metrics: StageMetrics::default(),
            clock,
        }
    }

    pub fn process(&self, input: In) -> Option<Out> {
        let started = Instant::now();
        self.metrics.record_input();
        let mut item = WorkItem::new(input);

        let mut skipped = false;
        for hook in &self.pre_hooks {
            match hook.apply(&mut item) {
                Decision::Continue => {}
                Decision::Skip => {
                    skipped = true;
                    break;
                }
                Decision::Fail(reason) => {
                    tracing::warn!(stage = %self.name, hook = hook.name(), %reason, "pre-hook failed, item proceeds with prior state");
                    self.metrics.record_hook_failure(&reason, self.clock.now());
                }
            }
        }

        if !skipped {
            match self.primary.invoke(&item.input) {
                Ok(out) => item.output = Some(out),
                Err(reason) => {
                    tracing::debug!(stage = %self.name, %reason, "primary plugin failed, dropping item");
                    self.metrics.record_drop(&reason, self.clock.now());
                    return None;
                }
            }
        } else {
            self.metrics.record_skip();
        }

        for hook in &self.post_hooks {
            match hook.apply(&mut item) {
                Decision::Continue => {}
                Decision::Skip => {
                    // A post-hook skip discards the item without emitting it
                    // (e.g. Text Validator dropping a low-confidence block).
                    self.metrics.record_drop("post-hook skip", self.clock.now());
                    return None;
                }
                Decision::Fail(reason) => {
                    tracing::warn!(stage = %self.name, hook = hook.name(), %reason, "post-hook failed, item proceeds with prior state");
                    self.metrics.record_hook_failure(&reason, self.clock.now());
                }
            }
        }

        match item.output {
            Some(out) => {
                self.metrics.record_output(started.elapsed());
                Some(out)
            }
            None => {
                self.metrics.record_drop("no output produced", self.clock.now());
                None
            }
        }
    }
}
