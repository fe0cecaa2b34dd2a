// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, HistogramVec, GaugeVec, Opts, Registry, TextEncoder, Encoder,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_gauge_vec_with_registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REQUEST METRICS
    // ============================================================================

    /// Total number of daemon requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("markpilot_requests_total", "Total number of daemon requests"),
        &["method", "endpoint", "status_code"],
        REGISTRY
    ).unwrap();

    /// Request duration histogram
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("markpilot_request_duration_seconds", "Request duration in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // PROVIDER METRICS
    // ============================================================================

    /// Total provider API calls
    pub static ref PROVIDER_CALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("markpilot_provider_calls_total", "Total provider API calls"),
        &["provider", "model", "status"],
        REGISTRY
    ).unwrap();

    /// Provider API call duration
    pub static ref PROVIDER_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("markpilot_provider_duration_seconds", "Provider API call duration")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["provider", "model"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // USAGE METRICS
    // ============================================================================

    /// Total tokens billed
    pub static ref TOKENS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("markpilot_tokens_total", "Total tokens billed"),
        &["provider", "model", "type"], // type: prompt, completion
        REGISTRY
    ).unwrap();

    /// Accumulated spend in USD
    pub static ref COST_USD_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("markpilot_cost_usd_total", "Accumulated spend in USD"),
        &["provider", "model"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Result cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("markpilot_cache_operations_total", "Total result cache operations"),
        &["operation"], // operation: hit, miss, join, store, bypass, clear
        REGISTRY
    ).unwrap();

    /// Current cache entries
    pub static ref CACHE_ENTRIES: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("markpilot_cache_entries_current", "Current number of result cache entries"),
        &["type"], // type: ready
        REGISTRY
    ).unwrap();

    // ============================================================================
    // COALESCER METRICS
    // ============================================================================

    /// Debounced call outcomes
    pub static ref COALESCER_EVENTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("markpilot_coalescer_events_total", "Total debounced call outcomes"),
        &["outcome"], // outcome: fired, forced, superseded, cancelled
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
