use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A small fixed-bucket latency histogram (powers of two, in microseconds),
/// cheap enough to update on every item without locking.
pub struct LatencyHistogram {
    buckets: [AtomicU64; 16],
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            buckets: Default::default(),
        }
    }
}

impl LatencyHistogram {
    pub fn record(&self, d: Duration) {
        let micros = d.as_micros().max(1);
        let bucket = (63 - micros.leading_zeros()).min(15) as usize;
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> [u64; 16] {
        let mut out = [0u64; 16];
        for (i, b) in self.buckets.iter().enumerate() {
            out[i] = b.load(Ordering::Relaxed);
        }
        out
    }
}

/// Per-stage observables: input/output/drop/skip/hook-failure/primary-
/// failure counters, plus a latency histogram and an EMA of throughput.
#[derive(Default)]
pub struct StageMetrics {
    pub input_count: AtomicU64,
    pub output_count: AtomicU64,
    pub drop_count: AtomicU64,
    pub skip_count: AtomicU64,
    pub hook_failure_count: AtomicU64,
    pub primary_failure_count: AtomicU64,
    pub latency: LatencyHistogram,
    throughput_ema_milli: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
    last_error_at_ns: AtomicU64,
}

impl StageMetrics {
    pub fn record_input(&self) {
        self.input_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_output(&self, latency: Duration) {
        self.output_count.fetch_add(1, Ordering::Relaxed);
        self.latency.record(latency);
        self.update_throughput(latency);
    }

    pub fn record_drop(&self, reason: &str, now_ns: u64) {
        self.drop_count.fetch_add(1, Ordering::Relaxed);
        self.primary_failure_count.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(reason, now_ns);
    }

    pub fn record_skip(&self) {
        self.skip_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hook_failure(&self, reason: &str, now_ns: u64) {
        self.hook_failure_count.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(reason, now_ns);
    }

    fn set_last_error(&self, reason: &str, now_ns: u64) {
        *self.last_error.lock().expect("metrics lock poisoned") = Some(reason.to_string());
        self.last_error_at_ns.store(now_ns, Ordering::Relaxed);
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("metrics lock poisoned").clone()
    }

    #[must_use]
    pub fn last_error_at_ns(&self) -> u64 {
        self.last_error_at_ns.load(Ordering::Relaxed)
    }

    /// EMA of items/sec, smoothed with alpha=0.2, derived from the
    /// reciprocal of each item's wall-clock latency.
    fn update_throughput(&self, latency: Duration) {
        let instantaneous = if latency.as_secs_f64() > 0.0 {
            (1.0 / latency.as_secs_f64() * 1000.0) as u64
        } else {
            0
        };
        let prev = self.throughput_ema_milli.load(Ordering::Relaxed);
        let next = if prev == 0 {
            instantaneous
        } else {
            (prev * 4 + instantaneous) / 5
        };
        self.throughput_ema_milli.store(next, Ordering::Relaxed);
    }

    #[must_use]
    pub fn throughput_ema_per_sec(&self) -> f64 {
        self.throughput_ema_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
