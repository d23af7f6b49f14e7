//! Configuration for the resilient client.
//!
//! # Example
//!
//! ```
//! use resilient_client::ResilientClientConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ResilientClientConfig::default();
//! assert_eq!(config.cache_capacity_bytes, 64 * 1024 * 1024); // 64 MB
//!
//! // Full config
//! let config = ResilientClientConfig {
//!     cache_capacity_bytes: 16 * 1024 * 1024,
//!     warming_interval_secs: 60,
//!     retry_max_retries: 2,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::retry::RetryConfig;

/// Per-resource rate limit settings.
///
/// Two gates are applied independently: the sliding window
/// (`max_requests` per `window_ms`) and the per-second sub-window.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_per_second")]
    pub max_per_second: usize,
}

fn default_max_requests() -> usize { 60 }
fn default_window_ms() -> u64 { 60_000 }
fn default_max_per_second() -> usize { 10 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            max_per_second: default_max_per_second(),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// A resource/key pair that the warmer refreshes on every cycle.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WarmTarget {
    pub resource: String,
    pub key: String,
}

/// Configuration for the resilient client.
///
/// All fields have sensible defaults. Per-resource rate limits fall back to
/// `default_rate_limit` for resources not listed in `rate_limits`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResilientClientConfig {
    /// Cache capacity in bytes (default: 64 MB)
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: usize,

    /// TTL used when every strategy abstains (default: 1 hour)
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Lower bound for computed TTLs (default: 5 minutes)
    #[serde(default = "default_min_ttl_secs")]
    pub min_ttl_secs: u64,

    /// Upper bound for computed TTLs (default: 24 hours)
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,

    /// Interval of the background expiry sweep (default: 60s)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Per-resource rate limits, keyed by resource class
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,

    /// Rate limit applied to resources absent from `rate_limits`
    #[serde(default)]
    pub default_rate_limit: RateLimitConfig,

    /// Circuit breaker thresholds
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_success_threshold")]
    pub circuit_success_threshold: u32,
    #[serde(default = "default_circuit_reset_timeout_ms")]
    pub circuit_reset_timeout_ms: u64,
    #[serde(default = "default_circuit_window_ms")]
    pub circuit_window_ms: u64,

    /// Retry parameters
    #[serde(default = "default_retry_max_retries")]
    pub retry_max_retries: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    /// Warming cycle interval (default: 5 minutes)
    #[serde(default = "default_warming_interval_secs")]
    pub warming_interval_secs: u64,

    /// Refresh entries whose remaining TTL fraction is below this (default: 0.25)
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold: f64,

    /// Minimum tracked access count before a query counts as popular
    #[serde(default = "default_min_popularity_score")]
    pub min_popularity_score: u64,

    /// Upper bound on warming tasks per cycle
    #[serde(default = "default_max_queries_per_cycle")]
    pub max_queries_per_cycle: usize,

    /// Always-warm resource/key pairs
    #[serde(default)]
    pub warm_list: Vec<WarmTarget>,
}

fn default_cache_capacity_bytes() -> usize { 64 * 1024 * 1024 }
fn default_ttl_secs() -> u64 { 3600 }
fn default_min_ttl_secs() -> u64 { 300 }
fn default_max_ttl_secs() -> u64 { 86_400 }
fn default_sweep_interval_secs() -> u64 { 60 }
fn default_circuit_failure_threshold() -> u32 { 5 }
fn default_circuit_success_threshold() -> u32 { 2 }
fn default_circuit_reset_timeout_ms() -> u64 { 30_000 }
fn default_circuit_window_ms() -> u64 { 60_000 }
fn default_retry_max_retries() -> u32 { 3 }
fn default_retry_initial_delay_ms() -> u64 { 1_000 }
fn default_retry_max_delay_ms() -> u64 { 30_000 }
fn default_retry_backoff_multiplier() -> f64 { 2.0 }
fn default_warming_interval_secs() -> u64 { 300 }
fn default_refresh_threshold() -> f64 { 0.25 }
fn default_min_popularity_score() -> u64 { 3 }
fn default_max_queries_per_cycle() -> usize { 10 }

impl Default for ResilientClientConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: default_cache_capacity_bytes(),
            default_ttl_secs: default_ttl_secs(),
            min_ttl_secs: default_min_ttl_secs(),
            max_ttl_secs: default_max_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            rate_limits: HashMap::new(),
            default_rate_limit: RateLimitConfig::default(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_success_threshold: default_circuit_success_threshold(),
            circuit_reset_timeout_ms: default_circuit_reset_timeout_ms(),
            circuit_window_ms: default_circuit_window_ms(),
            retry_max_retries: default_retry_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            warming_interval_secs: default_warming_interval_secs(),
            refresh_threshold: default_refresh_threshold(),
            min_popularity_score: default_min_popularity_score(),
            max_queries_per_cycle: default_max_queries_per_cycle(),
            warm_list: Vec::new(),
        }
    }
}

impl ResilientClientConfig {
    /// Rate limit for a resource class, falling back to the default.
    #[must_use]
    pub fn rate_limit_for(&self, resource: &str) -> &RateLimitConfig {
        self.rate_limits.get(resource).unwrap_or(&self.default_rate_limit)
    }

    /// Build the circuit breaker config shared by all per-resource breakers.
    #[must_use]
    pub fn circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold as usize,
            success_threshold: self.circuit_success_threshold as usize,
            reset_timeout: Duration::from_millis(self.circuit_reset_timeout_ms),
            window: Duration::from_millis(self.circuit_window_ms),
        }
    }

    /// Build the retry config used by the fetch path.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_max_retries,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    #[must_use]
    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }

    #[must_use]
    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}
