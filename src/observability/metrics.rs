// Runtime counters for an evaluation run
//
// Counters, gauges, and histograms updated by workers as outcomes are
// produced. Separate from the aggregate pass@k metrics: these describe the
// run itself (throughput, in-flight work, latency) and are logged as a
// summary at the end of each pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::types::{ErrorKind, ExecutionOutcome};

/// Counter metric (monotonically increasing)
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Gauge metric (can go up or down)
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Histogram bucket for latency tracking
#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Histogram metric for latency/duration tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // microseconds
    count: AtomicU64,
}

impl Histogram {
    /// Buckets sized for sample executions, from fast interpreters to the timeout ceiling
    pub fn new_latency() -> Self {
        let bucket_bounds = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

        let buckets = bucket_bounds
            .into_iter()
            .map(|le| HistogramBucket {
                le,
                count: AtomicU64::new(0),
            })
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        let micros = value.as_micros() as u64;

        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn get_bucket_count(&self, le: f64) -> u64 {
        self.buckets
            .iter()
            .find(|b| (b.le - le).abs() < 0.0001)
            .map(|b| b.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = self.get_count();
        (count > 0).then(|| Duration::from_micros(self.get_sum_micros() / count))
    }

    pub fn reset(&self) {
        self.sum.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        for bucket in &self.buckets {
            bucket.count.store(0, Ordering::Relaxed);
        }
    }
}

/// Counters for one evaluation pass
#[derive(Debug)]
pub struct MetricsRegistry {
    pub samples_total: Counter,
    pub samples_passed: Counter,
    pub samples_filtered: Counter,
    pub compile_errors: Counter,
    pub timeouts: Counter,
    pub policy_violations: Counter,
    pub runtime_failures: Counter,
    pub cancelled: Counter,
    pub internal_errors: Counter,

    pub in_flight: Gauge,
    pub queued: Gauge,

    pub execution_duration: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            samples_total: Counter::new(),
            samples_passed: Counter::new(),
            samples_filtered: Counter::new(),
            compile_errors: Counter::new(),
            timeouts: Counter::new(),
            policy_violations: Counter::new(),
            runtime_failures: Counter::new(),
            cancelled: Counter::new(),
            internal_errors: Counter::new(),
            in_flight: Gauge::new(),
            queued: Gauge::new(),
            execution_duration: Histogram::new_latency(),
        }
    }

    pub fn record_outcome(&self, outcome: &ExecutionOutcome) {
        self.samples_total.inc();

        match outcome.error_kind {
            None if outcome.passed => self.samples_passed.inc(),
            None => {}
            Some(ErrorKind::FilteredPreEvaluation) => self.samples_filtered.inc(),
            Some(ErrorKind::CompileError) => self.compile_errors.inc(),
            Some(ErrorKind::Timeout) => self.timeouts.inc(),
            Some(ErrorKind::PolicyViolation) => self.policy_violations.inc(),
            Some(ErrorKind::RuntimeFailure) => self.runtime_failures.inc(),
            Some(ErrorKind::Cancelled) => self.cancelled.inc(),
            Some(ErrorKind::InternalError) => self.internal_errors.inc(),
        }

        if !outcome.is_filtered() && outcome.error_kind != Some(ErrorKind::Cancelled) {
            self.execution_duration
                .observe(Duration::from_millis(outcome.duration_ms));
        }
    }

    /// Zero everything before the next pass
    pub fn reset(&self) {
        for counter in [
            &self.samples_total,
            &self.samples_passed,
            &self.samples_filtered,
            &self.compile_errors,
            &self.timeouts,
            &self.policy_violations,
            &self.runtime_failures,
            &self.cancelled,
            &self.internal_errors,
        ] {
            counter.reset();
        }
        self.in_flight.set(0);
        self.queued.set(0);
        self.execution_duration.reset();
    }

    /// One-line summary for the end-of-pass log
    pub fn summary(&self) -> String {
        let mean = self
            .execution_duration
            .mean()
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "n/a".to_string());

        format!(
            "samples={} passed={} filtered={} compile_errors={} timeouts={} policy_violations={} \
             runtime_failures={} cancelled={} internal_errors={} mean_duration={}",
            self.samples_total.get(),
            self.samples_passed.get(),
            self.samples_filtered.get(),
            self.compile_errors.get(),
            self.timeouts.get(),
            self.policy_violations.get(),
            self.runtime_failures.get(),
            self.cancelled.get(),
            self.internal_errors.get(),
            mean,
        )
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
static METRICS: once_cell::sync::Lazy<Arc<MetricsRegistry>> =
    once_cell::sync::Lazy::new(|| Arc::new(MetricsRegistry::new()));

/// Get global metrics registry
pub fn get_metrics() -> Arc<MetricsRegistry> {
    Arc::clone(&METRICS)
}
