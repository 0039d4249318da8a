use std::sync::Arc;
use std::time::Instant;

/// Nanoseconds since the owning pipeline's clock started. Strictly
/// non-decreasing within one process (`MonotonicClock::now` is backed by
/// `Instant`, which never goes backwards).
pub type MonotonicTimestamp = u64;

/// A source of monotonic timestamps, injectable so tests can advance time
/// deterministically instead of racing `Instant::now()`.
pub trait Clock: Send + Sync {
    fn now(&self) -> MonotonicTimestamp;
}

/// The real clock, anchored at construction time.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> MonotonicTimestamp {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// A manually-advanced clock for tests (circuit breaker cool-downs, frame
/// skip windows, autosave cadence).
pub struct TestClock {
    nanos: std::sync::atomic::AtomicU64,
}

impl TestClock {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nanos: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn advance(&self, nanos: u64) {
        self.nanos
            .fetch_add(nanos, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> MonotonicTimestamp {
        self.nanos.load(std::sync::atomic::Ordering::SeqCst)
    }
}

pub type SharedClock = Arc<dyn Clock>;
