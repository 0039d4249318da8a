use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::CoreError;

/// Circuit breaker state for one plugin instance (§4.7). `Open` remembers
/// the timestamp (from the pipeline's injectable clock, never
/// `Instant::now()` directly) it opened at, so the cool-down and the
/// half-open probe transition are deterministic under a `TestClock`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { opened_at_ns: u64 },
    HalfProbe,
}

/// Consecutive-failure circuit breaker plus a bounded crash-restart
/// supervisor for one plugin instance.
pub struct CircuitBreaker {
    plugin: String,
    state: Mutex<CircuitState>,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    cool_down: Duration,
    clock: SharedClock,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(plugin: impl Into<String>, failure_threshold: u32, cool_down: Duration, clock: SharedClock) -> Self {
        Self {
            plugin: plugin.into(),
            state: Mutex::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold,
            cool_down,
            clock,
        }
    }

    /// Whether a call should be attempted right now. Transitions
    /// `Open -> HalfProbe` when the cool-down has elapsed, admitting
    /// exactly one probe call; callers must report that call's outcome
    /// via `record_success`/`record_failure`.
    pub fn allow(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfProbe => Err(CoreError::PersistentEngine {
                plugin: self.plugin.clone(),
                remaining: Duration::ZERO,
            }),
            CircuitState::Open { opened_at_ns } => {
                let now = self.clock.now();
                let elapsed = Duration::from_nanos(now.saturating_sub(opened_at_ns));
                if elapsed >= self.cool_down {
                    *state = CircuitState::HalfProbe;
                    Ok(())
                } else {
                    Err(CoreError::PersistentEngine {
                        plugin: self.plugin.clone(),
                        remaining: self.cool_down - elapsed,
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.state.lock().expect("breaker lock poisoned") = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        if matches!(*state, CircuitState::HalfProbe) {
            *state = CircuitState::Open { opened_at_ns: self.clock.now() };
            self.consecutive_failures.store(self.failure_threshold, Ordering::SeqCst);
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            *state = CircuitState::Open { opened_at_ns: self.clock.now() };
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock().expect("breaker lock poisoned"), CircuitState::Open { .. })
    }

    /// A short label for `Pipeline::health()` snapshots.
    #[must_use]
    pub fn state_label(&self) -> &'static str {
        match *self.state.lock().expect("breaker lock poisoned") {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfProbe => "half-probe",
        }
    }
}

/// Restart supervisor: allows up to `max_restarts` within a rolling
/// `window`; beyond that the plugin is left `Stopped` with a persistent
/// fault reported rather than retried forever.
pub struct RestartSupervisor {
    restarts_in_window: Mutex<Vec<u64>>,
    max_restarts: u32,
    window: Duration,
    clock: SharedClock,
}

impl RestartSupervisor {
    #[must_use]
    pub fn new(max_restarts: u32, window: Duration, clock: SharedClock) -> Self {
        Self {
            restarts_in_window: Mutex::new(Vec::new()),
            max_restarts,
            window,
            clock,
        }
    }

    /// Records a crash and decides whether a restart should be attempted.
    pub fn should_restart(&self) -> bool {
        let now = self.clock.now();
        let window_ns = self.window.as_nanos() as u64;
        let mut restarts = self.restarts_in_window.lock().expect("supervisor lock poisoned");
        restarts.retain(|&at| now.saturating_sub(at) <= window_ns);
        if restarts.len() as u32 >= self.max_restarts {
            return false;
        }
        restarts.push(now);
        true
    }
}
