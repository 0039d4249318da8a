use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::plugin::descriptor::PluginDescriptor;
use crate::plugin::traits::Settings;

/// Lifecycle states of a `PluginInstance`.
///
/// `Discovered -> Validated -> Loaded -> Initialized -> Running <-> Paused
/// -> Stopped -> Unloaded`. Only `Running` instances receive work; a
/// crashed instance transitions to `Stopped` and becomes eligible for
/// restart by the health monitor (§4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Discovered,
    Validated,
    Loaded,
    Initialized,
    Running,
    Paused,
    Stopped,
    Unloaded,
}

impl LifecycleState {
    #[must_use]
    pub fn can_receive_work(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A live, initialized plugin: its validated settings, counters, and a
/// handle to the boxed implementation behind a mutex (the runtime's
/// contract is per-instance serialization unless the descriptor declares
/// `reentrant = true`, in which case callers may still share the Mutex —
/// reentrancy then just means the lock is uncontended by design rather
/// than required).
pub struct PluginInstance<P: ?Sized> {
    pub descriptor: PluginDescriptor,
    pub settings: Settings,
    state: Mutex<LifecycleState>,
    restart_count: AtomicU32,
    last_restart_at_ns: AtomicU64,
    pub handle: Arc<Mutex<Box<P>>>,
}

impl<P: ?Sized> PluginInstance<P> {
    #[must_use]
    pub fn new(descriptor: PluginDescriptor, settings: Settings, handle: Box<P>) -> Self {
        Self {
            descriptor,
            settings,
            state: Mutex::new(LifecycleState::Initialized),
            restart_count: AtomicU32::new(0),
            last_restart_at_ns: AtomicU64::new(0),
            handle: Arc::new(Mutex::new(handle)),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().expect("plugin state lock poisoned")
    }

    /// Transitions state, enforcing the lifecycle's legal edges.
    pub fn transition(&self, to: LifecycleState) -> Result<(), String> {
        let mut guard = self.state.lock().expect("plugin state lock poisoned");
        let from = *guard;
        let legal = matches!(
            (from, to),
            (LifecycleState::Discovered, LifecycleState::Validated)
                | (LifecycleState::Validated, LifecycleState::Loaded)
                | (LifecycleState::Loaded, LifecycleState::Initialized)
                | (LifecycleState::Initialized, LifecycleState::Running)
                | (LifecycleState::Running, LifecycleState::Paused)
                | (LifecycleState::Paused, LifecycleState::Running)
                | (LifecycleState::Running, LifecycleState::Stopped)
                | (LifecycleState::Paused, LifecycleState::Stopped)
                | (LifecycleState::Stopped, LifecycleState::Unloaded)
                | (LifecycleState::Stopped, LifecycleState::Running) // restart
        );
        if !legal {
            return Err(format!("illegal plugin transition {from:?} -> {to:?}"));
        }
        *guard = to;
        Ok(())
    }

    pub fn mark_crashed(&self) {
        let mut guard = self.state.lock().expect("plugin state lock poisoned");
        *guard = LifecycleState::Stopped;
    }

    pub fn record_restart(&self, now_ns: u64) -> u32 {
        self.last_restart_at_ns.store(now_ns, Ordering::SeqCst);
        self.restart_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_restart_at_ns(&self) -> u64 {
        self.last_restart_at_ns.load(Ordering::SeqCst)
    }

    pub fn reset_restart_window(&self) {
        self.restart_count.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    fn instance() -> PluginInstance<Noop> {
        PluginInstance::new(
            crate::plugin::descriptor::PluginDescriptor {
                name: "noop".to_string(),
                display_name: "Noop".to_string(),
                version: "0.1.0".to_string(),
                kind: crate::plugin::descriptor::PluginKind::Capture,
                target_stage: None,
                hook: None,
                dependencies: Vec::new(),
                runtime_requirements: Default::default(),
                settings: Default::default(),
                enabled: true,
            },
            Settings::new(),
            Box::new(Noop),
        )
    }

    #[test]
    fn legal_lifecycle_walk_succeeds() {
        let inst = instance();
        assert_eq!(inst.state(), LifecycleState::Initialized);
        inst.transition(LifecycleState::Running).unwrap();
        inst.transition(LifecycleState::Paused).unwrap();
        inst.transition(LifecycleState::Running).unwrap();
        inst.transition(LifecycleState::Stopped).unwrap();
        inst.transition(LifecycleState::Unloaded).unwrap();
    }

    #[test]
    fn illegal_transition_rejected() {
        let inst = instance();
        assert!(inst.transition(LifecycleState::Unloaded).is_err());
    }

    #[test]
    fn crash_forces_stopped_and_allows_restart() {
        let inst = instance();
        inst.transition(LifecycleState::Running).unwrap();
        inst.mark_crashed();
        assert_eq!(inst.state(), LifecycleState::Stopped);
        inst.transition(LifecycleState::Running).unwrap();
    }
}
