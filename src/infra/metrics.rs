//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Position fetch latency bucket boundaries (microseconds)
/// Buckets: ≤1ms, ≤5ms, ≤10ms, ≤50ms, ≤100ms, ≤250ms, ≤500ms, ≤1s, ≤2.5s, ≤5s, >5s
const BUCKET_BOUNDS: [u64; 10] =
    [1_000, 5_000, 10_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, 2_500_000, 5_000_000];
const NUM_BUCKETS: usize = 11;

/// Upper bounds for percentile reporting (last bucket uses 2x the previous bound)
const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [
    1_000, 5_000, 10_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, 2_500_000, 5_000_000,
    10_000_000,
];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile.
/// The target rank is at least 1 so small samples land in an occupied bucket.
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Notifications handled by the correlator (monotonic)
    events_total: AtomicU64,
    /// Notifications since last report (reset on report)
    events_since_report: AtomicU64,
    /// Notifications dropped because the channel was full (monotonic)
    notifications_dropped: AtomicU64,
    /// Payloads too short to carry an event code (monotonic)
    malformed_total: AtomicU64,
    /// Event codes that are neither trigger (monotonic)
    ignored_total: AtomicU64,
    /// Origins captured from AwaitingOrigin (monotonic)
    origins_captured: AtomicU64,
    /// Origins overwritten while awaiting a destination (monotonic)
    origins_recaptured: AtomicU64,
    /// Heading results emitted (monotonic)
    results_total: AtomicU64,
    /// Position requests that failed (monotonic)
    position_failures: AtomicU64,
    /// Destination triggers with no origin (monotonic)
    out_of_sequence_total: AtomicU64,
    /// Position fetches since last report (reset on report)
    fetches_since_report: AtomicU64,
    /// Sum of fetch latencies in microseconds (reset on report)
    fetch_latency_sum_us: AtomicU64,
    /// Max fetch latency in microseconds (reset on report)
    fetch_latency_max_us: AtomicU64,
    /// Fetch latency histogram buckets (reset on report)
    fetch_latency_buckets: [AtomicU64; NUM_BUCKETS],
    last_report_time: Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            malformed_total: AtomicU64::new(0),
            ignored_total: AtomicU64::new(0),
            origins_captured: AtomicU64::new(0),
            origins_recaptured: AtomicU64::new(0),
            results_total: AtomicU64::new(0),
            position_failures: AtomicU64::new(0),
            out_of_sequence_total: AtomicU64::new(0),
            fetches_since_report: AtomicU64::new(0),
            fetch_latency_sum_us: AtomicU64::new(0),
            fetch_latency_max_us: AtomicU64::new(0),
            fetch_latency_buckets: Default::default(),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_event(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.malformed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ignored(&self) {
        self.ignored_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_origin_captured(&self) {
        self.origins_captured.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_origin_recaptured(&self) {
        self.origins_recaptured.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_result(&self) {
        self.results_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_failure(&self) {
        self.position_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_out_of_sequence(&self) {
        self.out_of_sequence_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a position request took, successful or not
    #[inline]
    pub fn record_fetch_latency(&self, latency_us: u64) {
        self.fetches_since_report.fetch_add(1, Ordering::Relaxed);
        self.fetch_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.fetch_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.fetch_latency_max_us, latency_us);
    }

    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn origins_captured(&self) -> u64 {
        self.origins_captured.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn results_total(&self) -> u64 {
        self.results_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn position_failures(&self) -> u64 {
        self.position_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn out_of_sequence_total(&self) -> u64 {
        self.out_of_sequence_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn ignored_total(&self) -> u64 {
        self.ignored_total.load(Ordering::Relaxed)
    }

    /// Produce a summary and reset the periodic counters
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let fetch_count = self.fetches_since_report.swap(0, Ordering::Relaxed);
        let fetch_sum = self.fetch_latency_sum_us.swap(0, Ordering::Relaxed);
        let fetch_max = self.fetch_latency_max_us.swap(0, Ordering::Relaxed);
        let fetch_buckets = swap_buckets(&self.fetch_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            malformed_total: self.malformed_total.load(Ordering::Relaxed),
            ignored_total: self.ignored_total.load(Ordering::Relaxed),
            origins_captured: self.origins_captured.load(Ordering::Relaxed),
            origins_recaptured: self.origins_recaptured.load(Ordering::Relaxed),
            results_total: self.results_total.load(Ordering::Relaxed),
            position_failures: self.position_failures.load(Ordering::Relaxed),
            out_of_sequence_total: self.out_of_sequence_total.load(Ordering::Relaxed),
            fetch_count,
            fetch_avg_us: if fetch_count > 0 { fetch_sum / fetch_count } else { 0 },
            fetch_max_us: fetch_max,
            fetch_p99_us: percentile_from_buckets(&fetch_buckets, 0.99),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub notifications_dropped: u64,
    pub malformed_total: u64,
    pub ignored_total: u64,
    pub origins_captured: u64,
    pub origins_recaptured: u64,
    pub results_total: u64,
    pub position_failures: u64,
    pub out_of_sequence_total: u64,
    /// Position fetches in this period
    pub fetch_count: u64,
    pub fetch_avg_us: u64,
    pub fetch_max_us: u64,
    pub fetch_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            dropped = %self.notifications_dropped,
            malformed = %self.malformed_total,
            ignored = %self.ignored_total,
            origins = %self.origins_captured,
            recaptures = %self.origins_recaptured,
            results = %self.results_total,
            position_failures = %self.position_failures,
            out_of_sequence = %self.out_of_sequence_total,
            fetch_avg_us = %self.fetch_avg_us,
            fetch_p99_us = %self.fetch_p99_us,
            "metrics"
        );
    }
}
