//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap). `snapshot()` reads the
//! cumulative series and never resets anything.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

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

/// Load all buckets without resetting them
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
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
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

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
    /// Total input events ever processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Event processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Event processing latency histogram buckets (monotonic)
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Sum of all event latencies in microseconds (monotonic)
    latency_sum_total_us: AtomicU64,
    /// Position fixes processed (monotonic)
    fixes_total: AtomicU64,
    /// Proximity alerts raised (monotonic)
    alerts_total: AtomicU64,
    /// Routes planned (monotonic)
    routes_planned_total: AtomicU64,
    /// Route planning latency histogram buckets (reset on report)
    plan_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of route planning latencies (reset on report)
    plan_latency_sum_us: AtomicU64,
    /// Max route planning latency (reset on report)
    plan_latency_max_us: AtomicU64,
    /// Route planning latency histogram buckets (monotonic)
    plan_latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Sum of all route planning latencies (monotonic)
    plan_latency_sum_total_us: AtomicU64,
    /// Status changes applied to the stop directory (monotonic)
    status_updates_total: AtomicU64,
    /// Session resets (monotonic)
    resets_total: AtomicU64,
    /// Input lines that failed to parse or validate (monotonic)
    input_rejected_total: AtomicU64,
    /// Fixes suppressed by the cadence policy (monotonic)
    fixes_throttled_total: AtomicU64,
    /// Input events dropped due to channel full (monotonic)
    events_dropped_total: AtomicU64,
    /// Egress records that could not be written (monotonic)
    egress_failed_total: AtomicU64,
    /// Active stops at the last fix (gauge)
    active_stops: AtomicU64,
    /// Stops alerted in the current session (gauge)
    alerted_stops: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            fixes_total: AtomicU64::new(0),
            alerts_total: AtomicU64::new(0),
            routes_planned_total: AtomicU64::new(0),
            plan_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            plan_latency_sum_us: AtomicU64::new(0),
            plan_latency_max_us: AtomicU64::new(0),
            plan_latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            plan_latency_sum_total_us: AtomicU64::new(0),
            status_updates_total: AtomicU64::new(0),
            resets_total: AtomicU64::new(0),
            input_rejected_total: AtomicU64::new(0),
            fixes_throttled_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            egress_failed_total: AtomicU64::new(0),
            active_stops: AtomicU64::new(0),
            alerted_stops: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an input event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_fix(&self) {
        self.fixes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alerts(&self, count: u64) {
        self.alerts_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a route plan and its computation time (lock-free)
    #[inline]
    pub fn record_route_planned(&self, latency_us: u64) {
        self.routes_planned_total.fetch_add(1, Ordering::Relaxed);
        self.plan_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.plan_latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.plan_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.plan_latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.plan_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_status_update(&self) {
        self.status_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reset(&self) {
        self.resets_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_input_rejected(&self) {
        self.input_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_throttled(&self) {
        self.fixes_throttled_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an input event dropped due to channel full (lock-free)
    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record egress records that failed to write (lock-free)
    #[inline]
    pub fn record_egress_failed(&self, count: u64) {
        self.egress_failed_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_active_stops(&self, count: u64) {
        self.active_stops.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_alerted_stops(&self, count: u64) {
        self.alerted_stops.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fixes_total(&self) -> u64 {
        self.fixes_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alerts_total(&self) -> u64 {
        self.alerts_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn routes_planned_total(&self) -> u64 {
        self.routes_planned_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn status_updates_total(&self) -> u64 {
        self.status_updates_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn input_rejected_total(&self) -> u64 {
        self.input_rejected_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fixes_throttled_total(&self) -> u64 {
        self.fixes_throttled_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped_total(&self) -> u64 {
        self.events_dropped_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn egress_failed_total(&self) -> u64 {
        self.egress_failed_total.load(Ordering::Relaxed)
    }

    /// Cumulative view for scrapers; leaves the periodic counters untouched
    pub fn snapshot(&self) -> MetricsSnapshot {
        let lat_buckets = load_buckets(&self.latency_buckets_total);
        let plan_lat_buckets = load_buckets(&self.plan_latency_buckets_total);

        MetricsSnapshot {
            events_total: self.events_total.load(Ordering::Relaxed),
            lat_buckets,
            lat_sum_us: self.latency_sum_total_us.load(Ordering::Relaxed),
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            fixes_total: self.fixes_total.load(Ordering::Relaxed),
            alerts_total: self.alerts_total.load(Ordering::Relaxed),
            routes_planned_total: self.routes_planned_total.load(Ordering::Relaxed),
            plan_lat_buckets,
            plan_lat_sum_us: self.plan_latency_sum_total_us.load(Ordering::Relaxed),
            plan_lat_p99_us: percentile_from_buckets(&plan_lat_buckets, 0.99),
            status_updates_total: self.status_updates_total.load(Ordering::Relaxed),
            resets_total: self.resets_total.load(Ordering::Relaxed),
            input_rejected_total: self.input_rejected_total.load(Ordering::Relaxed),
            fixes_throttled_total: self.fixes_throttled_total.load(Ordering::Relaxed),
            events_dropped_total: self.events_dropped_total.load(Ordering::Relaxed),
            egress_failed_total: self.egress_failed_total.load(Ordering::Relaxed),
            active_stops: self.active_stops.load(Ordering::Relaxed),
            alerted_stops: self.alerted_stops.load(Ordering::Relaxed),
        }
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let plan_buckets = swap_buckets(&self.plan_latency_buckets);
        let plan_sum = self.plan_latency_sum_us.swap(0, Ordering::Relaxed);
        let plan_max = self.plan_latency_max_us.swap(0, Ordering::Relaxed);
        let plan_count: u64 = plan_buckets.iter().sum();

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
            avg_process_latency_us: if events_count > 0 { latency_sum / events_count } else { 0 },
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            fixes_total: self.fixes_total.load(Ordering::Relaxed),
            alerts_total: self.alerts_total.load(Ordering::Relaxed),
            routes_planned_total: self.routes_planned_total.load(Ordering::Relaxed),
            plan_lat_buckets: plan_buckets,
            plan_lat_avg_us: if plan_count > 0 { plan_sum / plan_count } else { 0 },
            plan_lat_max_us: plan_max,
            plan_lat_p99_us: percentile_from_buckets(&plan_buckets, 0.99),
            status_updates_total: self.status_updates_total.load(Ordering::Relaxed),
            resets_total: self.resets_total.load(Ordering::Relaxed),
            input_rejected_total: self.input_rejected_total.load(Ordering::Relaxed),
            fixes_throttled_total: self.fixes_throttled_total.load(Ordering::Relaxed),
            events_dropped_total: self.events_dropped_total.load(Ordering::Relaxed),
            egress_failed_total: self.egress_failed_total.load(Ordering::Relaxed),
            active_stops: self.active_stops.load(Ordering::Relaxed),
            alerted_stops: self.alerted_stops.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Event processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub fixes_total: u64,
    pub alerts_total: u64,
    pub routes_planned_total: u64,
    /// Route planning latency histogram buckets (same bounds)
    pub plan_lat_buckets: [u64; NUM_BUCKETS],
    pub plan_lat_avg_us: u64,
    pub plan_lat_max_us: u64,
    pub plan_lat_p99_us: u64,
    pub status_updates_total: u64,
    pub resets_total: u64,
    pub input_rejected_total: u64,
    pub fixes_throttled_total: u64,
    pub events_dropped_total: u64,
    pub egress_failed_total: u64,
    pub active_stops: u64,
    pub alerted_stops: u64,
}

/// Cumulative metrics since startup, as exposed to Prometheus
#[derive(Debug)]
pub struct MetricsSnapshot {
    pub events_total: u64,
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_sum_us: u64,
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub fixes_total: u64,
    pub alerts_total: u64,
    pub routes_planned_total: u64,
    pub plan_lat_buckets: [u64; NUM_BUCKETS],
    pub plan_lat_sum_us: u64,
    pub plan_lat_p99_us: u64,
    pub status_updates_total: u64,
    pub resets_total: u64,
    pub input_rejected_total: u64,
    pub fixes_throttled_total: u64,
    pub events_dropped_total: u64,
    pub egress_failed_total: u64,
    pub active_stops: u64,
    pub alerted_stops: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p99_us = %self.lat_p99_us,
            fixes = %self.fixes_total,
            alerts = %self.alerts_total,
            routes = %self.routes_planned_total,
            plan_p99_us = %self.plan_lat_p99_us,
            active_stops = %self.active_stops,
            alerted_stops = %self.alerted_stops,
            rejected = %self.input_rejected_total,
            dropped = %self.events_dropped_total,
            egress_failed = %self.egress_failed_total,
            "metrics"
        );
    }
}
