//! Prometheus metrics for the verification engine.
//!
//! The [`EngineMetrics`] struct owns a dedicated [`Registry`] that an
//! embedding service can encode into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

/// Central collection of engine-level Prometheus metrics.
pub struct EngineMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Verification runs started (including fast-cache answers).
    pub identify_runs: IntCounter,
    pub fast_cache_hits: IntCounter,
    pub slow_cache_hits: IntCounter,
    /// Callers released before all proof checks finished.
    pub eager_unblocks: IntCounter,
    pub proof_checks: IntCounter,
    /// Proof checks that came back soft- or hard-broken.
    pub proof_failures: IntCounter,
    /// Runs performed by the background identifier.
    pub watch_runs: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Identities currently holding a single-flight lock.
    pub lock_table_size: IntGauge,
    /// Identities on the background watch list.
    pub watch_queue_len: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time until the caller was answered, in milliseconds.
    pub identify_duration_ms: Histogram,
}

impl EngineMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let identify_runs = register_int_counter_with_registry!(
            Opts::new("vetted_identify_runs_total", "Total verification runs"),
            registry
        )
        .expect("failed to register identify_runs counter");

        let fast_cache_hits = register_int_counter_with_registry!(
            Opts::new("vetted_fast_cache_hits_total", "Fast-tier cache hits"),
            registry
        )
        .expect("failed to register fast_cache_hits counter");

        let slow_cache_hits = register_int_counter_with_registry!(
            Opts::new("vetted_slow_cache_hits_total", "Slow-tier cache hits"),
            registry
        )
        .expect("failed to register slow_cache_hits counter");

        let eager_unblocks = register_int_counter_with_registry!(
            Opts::new(
                "vetted_eager_unblocks_total",
                "Callers unblocked before proof checking completed"
            ),
            registry
        )
        .expect("failed to register eager_unblocks counter");

        let proof_checks = register_int_counter_with_registry!(
            Opts::new("vetted_proof_checks_total", "Remote proof checks performed"),
            registry
        )
        .expect("failed to register proof_checks counter");

        let proof_failures = register_int_counter_with_registry!(
            Opts::new("vetted_proof_failures_total", "Remote proof checks that failed"),
            registry
        )
        .expect("failed to register proof_failures counter");

        let watch_runs = register_int_counter_with_registry!(
            Opts::new("vetted_watch_runs_total", "Background re-verification runs"),
            registry
        )
        .expect("failed to register watch_runs counter");

        // Gauges
        let lock_table_size = register_int_gauge_with_registry!(
            Opts::new("vetted_lock_table_size", "Identities holding a single-flight lock"),
            registry
        )
        .expect("failed to register lock_table_size gauge");

        let watch_queue_len = register_int_gauge_with_registry!(
            Opts::new("vetted_watch_queue_len", "Identities on the watch list"),
            registry
        )
        .expect("failed to register watch_queue_len gauge");

        // Histogram – exponential buckets covering 1 ms → ~16 s.
        let identify_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "vetted_identify_duration_ms",
                "Time until the caller was answered, in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register identify_duration_ms histogram");

        Self {
            registry,
            identify_runs,
            fast_cache_hits,
            slow_cache_hits,
            eager_unblocks,
            proof_checks,
            proof_failures,
            watch_runs,
            lock_table_size,
            watch_queue_len,
            identify_duration_ms,
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_families_are_registered() {
        let metrics = EngineMetrics::new();
        metrics.identify_runs.inc();
        metrics.identify_duration_ms.observe(3.0);
        let names: Vec<_> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"vetted_identify_runs_total".to_string()));
        assert!(names.contains(&"vetted_identify_duration_ms".to_string()));
        assert_eq!(names.len(), 10);
    }
}
