// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    REQUESTS_TOTAL,
    REQUEST_DURATION,
    PROVIDER_CALLS,
    PROVIDER_DURATION,
    TOKENS_TOTAL,
    COST_USD_TOTAL,
    CACHE_OPERATIONS,
    CACHE_ENTRIES,
    COALESCER_EVENTS,
};

use crate::ledger::TokenUsage;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Helper to record daemon request metrics
pub fn record_request(method: &str, endpoint: &str, status_code: u16, duration_secs: f64) {
    REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status_code.to_string()])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

/// Helper to record provider API call metrics
pub fn record_provider_call(provider: &str, model: &str, status: &str, duration_secs: f64) {
    PROVIDER_CALLS
        .with_label_values(&[provider, model, status])
        .inc();

    PROVIDER_DURATION
        .with_label_values(&[provider, model])
        .observe(duration_secs);
}

/// Helper to record billed usage
pub fn record_usage(provider: &str, model: &str, usage: &TokenUsage, cost: Decimal) {
    if usage.prompt_tokens > 0 {
        TOKENS_TOTAL
            .with_label_values(&[provider, model, "prompt"])
            .inc_by(usage.prompt_tokens as f64);
    }
    if usage.completion_tokens > 0 {
        TOKENS_TOTAL
            .with_label_values(&[provider, model, "completion"])
            .inc_by(usage.completion_tokens as f64);
    }
    if let Some(cost) = cost.to_f64().filter(|c| *c > 0.0) {
        COST_USD_TOTAL.with_label_values(&[provider, model]).inc_by(cost);
    }
}

/// Helper to record result cache operations
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

pub fn record_cache_join() {
    CACHE_OPERATIONS.with_label_values(&["join"]).inc();
}

pub fn record_cache_store() {
    CACHE_OPERATIONS.with_label_values(&["store"]).inc();
}

pub fn record_cache_bypass() {
    CACHE_OPERATIONS.with_label_values(&["bypass"]).inc();
}

pub fn record_cache_clear() {
    CACHE_OPERATIONS.with_label_values(&["clear"]).inc();
}

pub fn update_cache_entries(count: usize) {
    CACHE_ENTRIES.with_label_values(&["ready"]).set(count as f64);
}

/// Helper to record what happened to a debounced call
pub fn record_coalescer_event(outcome: &str) {
    COALESCER_EVENTS.with_label_values(&[outcome]).inc();
}
