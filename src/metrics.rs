// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the resilient client.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `resilient_client_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `resource`: resource class (search, docs, social, forum, ...)
//! - `outcome`: hit, miss, expired / success, error, rejected
//! - `stage`: cache, rate_limit, circuit, loader

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::resilience::CircuitState;

/// Record a completed fetch and its outcome
pub fn record_fetch(resource: &str, outcome: &str) {
    counter!(
        "resilient_client_fetches_total",
        "resource" => resource.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record end-to-end fetch latency
pub fn record_fetch_latency(resource: &str, duration: Duration) {
    histogram!(
        "resilient_client_fetch_seconds",
        "resource" => resource.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a single loader attempt latency
pub fn record_loader_latency(resource: &str, duration: Duration) {
    histogram!(
        "resilient_client_loader_seconds",
        "resource" => resource.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE - Lookups, sweeps, evictions
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup (outcome: hit, miss, expired)
pub fn record_cache_lookup(outcome: &str) {
    counter!(
        "resilient_client_cache_lookups_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record entries removed by a sweep pass
pub fn record_cache_sweep(count: usize) {
    counter!("resilient_client_cache_swept_total").increment(count as u64);
}

/// Record an eviction event
pub fn record_cache_eviction(count: usize, bytes: usize) {
    counter!("resilient_client_evictions_total").increment(count as u64);
    counter!("resilient_client_evicted_bytes_total").increment(bytes as u64);
}

/// Record the size of a stored entry
pub fn record_entry_bytes(resource: &str, bytes: usize) {
    histogram!(
        "resilient_client_entry_bytes",
        "resource" => resource.to_string()
    )
    .record(bytes as f64);
}

/// Set current cache occupancy gauges
pub fn set_cache_stats(entries: usize, bytes: usize, hit_rate: f64) {
    gauge!("resilient_client_cache_entries").set(entries as f64);
    gauge!("resilient_client_cache_bytes").set(bytes as f64);
    gauge!("resilient_client_cache_hit_rate").set(hit_rate);
}

/// Record a computed TTL
pub fn record_ttl(resource: &str, ttl: Duration) {
    histogram!(
        "resilient_client_ttl_seconds",
        "resource" => resource.to_string()
    )
    .record(ttl.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// RATE LIMITING - Denials and waits
// ═══════════════════════════════════════════════════════════════════════════

/// Record a local rate limit denial
pub fn record_rate_limit_denial(resource: &str, reason: String) {
    counter!(
        "resilient_client_rate_limit_denials_total",
        "resource" => resource.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Set current window occupancy for a resource
pub fn set_rate_window_requests(resource: &str, count: usize) {
    gauge!(
        "resilient_client_rate_window_requests",
        "resource" => resource.to_string()
    )
    .set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// CIRCUIT BREAKER - State and rejections
// ═══════════════════════════════════════════════════════════════════════════

/// Record a circuit state transition and expose the new state as a gauge
/// (0 = closed, 1 = half_open, 2 = open)
pub fn record_circuit_transition(resource: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "resilient_client_circuit_transitions_total",
        "resource" => resource.to_string(),
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);

    let level = match to {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!(
        "resilient_client_circuit_state",
        "resource" => resource.to_string()
    )
    .set(level);
}

/// Record a fast-fail rejection from an open circuit
pub fn record_circuit_rejection(resource: &str) {
    counter!(
        "resilient_client_circuit_rejections_total",
        "resource" => resource.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// RETRY - Attempts and exhaustion
// ═══════════════════════════════════════════════════════════════════════════

/// Record a retry attempt being scheduled
pub fn record_retry_attempt(label: &str) {
    counter!(
        "resilient_client_retry_attempts_total",
        "label" => label.to_string()
    )
    .increment(1);
}

/// Record a request giving up after exhausting retries
pub fn record_retry_exhausted(label: &str) {
    counter!(
        "resilient_client_retries_exhausted_total",
        "label" => label.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// WARMING - Cycle outcomes
// ═══════════════════════════════════════════════════════════════════════════

/// Record one warming task outcome (reason: predefined, expiring, manual)
pub fn record_warming_task(reason: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "resilient_client_warming_tasks_total",
        "reason" => reason.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record warming cycle duration
pub fn record_warming_cycle(duration: Duration, tasks: usize) {
    histogram!("resilient_client_warming_cycle_seconds").record(duration.as_secs_f64());
    histogram!("resilient_client_warming_cycle_tasks").record(tasks as f64);
}

/// A timing guard that records loader latency on drop
pub struct LatencyTimer {
    resource: String,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_fetch_latency(&self.resource, self.start.elapsed());
    }
}

/// Convenience macro for timing a fetch
#[macro_export]
macro_rules! time_fetch {
    ($resource:expr) => {
        $crate::metrics::LatencyTimer::new($resource)
    };
}
