// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The composing facade over cache, rate limiting, resilience and warming.
//!
//! ```text
//!  fetch(resource, key, loader)
//!       │
//!       ▼
//!  ┌─────────┐  hit   ┌──────────────┐
//!  │  cache   │──────▶│ return value │
//!  └────┬─────┘        └──────────────┘
//!       │ miss
//!       ▼
//!  ┌─────────────┐ deny ┌──────────────┐
//!  │ rate limiter │────▶│ RateLimited  │
//!  └────┬─────────┘      └──────────────┘
//!       │ allow
//!       ▼
//!  ┌──────────────────────────────┐
//!  │ retry ▶ breaker ▶ loader call │──▶ adaptive TTL ──▶ cache.set
//!  └──────────────────────────────┘
//! ```
//!
//! Loader attempts run in spawned tasks so a caller dropping its future
//! does not cancel an in-flight remote call mid-request.

pub mod types;

mod lifecycle;

pub use types::{ClientState, FetchContext, Loader};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheStore};
use crate::config::ResilientClientConfig;
use crate::error::{FetchError, RateLimitReason};
use crate::popularity::PopularityTracker;
use crate::ratelimit::{RateLimitStats, RateLimiter};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitRegistry, CircuitStats};
use crate::resilience::classifier::{ErrorClassifier, StandardClassifier};
use crate::resilience::retry::{retry, RetryConfig};
use crate::ttl::{TtlContext, TtlEngine};
use crate::warming::{build_worklist, WarmReason, WarmerState, WarmingStats};

/// Cache key shared by the fetch path and the warmer.
fn composite_key(resource: &str, key: &str) -> String {
    format!("{resource}:{key}")
}

/// Whether a loader failure should count against the circuit breaker.
///
/// Rate limits and auth failures say nothing about upstream health, and
/// 4xx responses are the caller's fault.
fn counts_as_circuit_failure(error: &FetchError) -> bool {
    match error {
        FetchError::Network(_) | FetchError::Timeout { .. } | FetchError::Unknown(_) => true,
        FetchError::Upstream { status, .. } => *status >= 500,
        _ => false,
    }
}

pub struct ResilientClient {
    config: ResilientClientConfig,
    cache: CacheStore,
    ttl: RwLock<TtlEngine>,
    limiter: RateLimiter,
    circuits: CircuitRegistry,
    retry_config: RetryConfig,
    classifier: Arc<dyn ErrorClassifier>,
    popularity: PopularityTracker,
    warmer: WarmerState,
    loaders: DashMap<String, Arc<dyn Loader>>,
    state: Mutex<ClientState>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ResilientClient {
    #[must_use]
    pub fn new(config: ResilientClientConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let ttl = TtlEngine::with_defaults(
            config.min_ttl(),
            config.max_ttl(),
            config.default_ttl(),
        );
        Self {
            cache: CacheStore::new(config.cache_capacity_bytes),
            ttl: RwLock::new(ttl),
            limiter: RateLimiter::new(config.rate_limits.clone(), config.default_rate_limit.clone()),
            circuits: CircuitRegistry::new(config.circuit_config()),
            retry_config: config.retry_config(),
            classifier: Arc::new(StandardClassifier),
            popularity: PopularityTracker::new(config.min_popularity_score),
            warmer: WarmerState::new(),
            loaders: DashMap::new(),
            state: Mutex::new(ClientState::Created),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Swap the failure classifier (defaults to [`StandardClassifier`]).
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the TTL engine, e.g. with a custom strategy set.
    pub fn set_ttl_engine(&self, engine: TtlEngine) {
        *self.ttl.write() = engine;
    }

    /// Fetch with default per-call options.
    pub async fn fetch<F, Fut>(
        &self,
        resource: &str,
        key: &str,
        loader: F,
    ) -> Result<Value, FetchError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        self.fetch_with(resource, key, FetchContext::default(), loader)
            .await
    }

    /// Cache-first fetch running the full protection pipeline on a miss.
    #[tracing::instrument(skip(self, ctx, loader))]
    pub async fn fetch_with<F, Fut>(
        &self,
        resource: &str,
        key: &str,
        ctx: FetchContext,
        loader: F,
    ) -> Result<Value, FetchError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let _timer = crate::metrics::LatencyTimer::new(resource);
        let cache_key = composite_key(resource, key);
        let query = ctx.query.clone().unwrap_or_else(|| key.to_string());
        self.popularity.record(&query);
        // The warmer looks entries up by caller key, so an explicit query
        // must count against the key too or its entry never gets refreshed
        if crate::popularity::normalize(&query) != crate::popularity::normalize(key) {
            self.popularity.record(key);
        }

        if let Some(value) = self.cache.get(&cache_key) {
            debug!(resource, key, "Cache hit");
            crate::metrics::record_fetch(resource, "hit");
            return Ok(value);
        }

        let result = self.load_and_store(resource, key, &ctx, loader).await;
        match &result {
            Ok(_) => crate::metrics::record_fetch(resource, "success"),
            Err(error) if error.is_local_denial() => {
                crate::metrics::record_fetch(resource, "rejected");
            }
            Err(_) => crate::metrics::record_fetch(resource, "error"),
        }
        result
    }

    /// Miss path: rate gate, then retried breaker-guarded loader attempts,
    /// then TTL computation and cache write.
    async fn load_and_store<F, Fut>(
        &self,
        resource: &str,
        key: &str,
        ctx: &FetchContext,
        loader: F,
    ) -> Result<Value, FetchError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        if ctx.wait_for_slot {
            self.limiter.wait_for_slot(resource).await;
        } else {
            let decision = self.limiter.acquire(resource);
            if !decision.allowed {
                return Err(FetchError::RateLimited {
                    resource: resource.to_string(),
                    reason: decision.reason.unwrap_or(RateLimitReason::WindowLimit),
                    retry_after: decision.wait,
                });
            }
        }

        let label = composite_key(resource, key);
        let breaker = self.circuits.breaker(resource);
        let timeout = ctx.timeout;

        let value = retry(&label, &self.retry_config, self.classifier.as_ref(), |_attempt| {
            let fut = loader();
            let breaker = breaker.clone();
            let resource = resource.to_string();
            async move {
                breaker.try_acquire()?;

                let started = std::time::Instant::now();
                // Detached so the remote call survives caller abandonment;
                // the timeout races inside the spawned task.
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout { elapsed: timeout }),
                    }
                });
                let outcome = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => {
                        Err(FetchError::Unknown(format!("loader task failed: {join_error}")))
                    }
                };
                crate::metrics::record_loader_latency(&resource, started.elapsed());

                match &outcome {
                    Ok(_) => breaker.record_success(),
                    Err(error) => {
                        if let FetchError::RateLimited {
                            reason: RateLimitReason::Upstream,
                            retry_after,
                            ..
                        } = error
                        {
                            self.limiter.record_rejection(&resource, *retry_after);
                        }
                        if counts_as_circuit_failure(error) {
                            breaker.record_failure();
                        }
                    }
                }
                outcome
            }
        })
        .await?;

        let query = ctx.query.as_deref().unwrap_or(key);
        let ttl = {
            let mut ttl_ctx = TtlContext::new(resource)
                .with_query(query)
                .popular(self.popularity.is_popular(query));
            if let Some(items) = value.as_array() {
                ttl_ctx = ttl_ctx.with_result_count(items.len());
            }
            self.ttl.read().compute(&ttl_ctx)
        };
        crate::metrics::record_ttl(resource, ttl);
        crate::metrics::record_entry_bytes(resource, value.to_string().len());

        let cache_key = composite_key(resource, key);
        self.cache.set(&cache_key, value.clone(), ttl)?;
        debug!(resource, key, ttl_secs = ttl.as_secs(), "Stored loader result");
        Ok(value)
    }

    /// Register the data source used when the warmer refreshes this
    /// resource class without a caller present.
    pub fn register_loader(&self, resource: &str, loader: Arc<dyn Loader>) {
        self.loaders.insert(resource.to_string(), loader);
    }

    /// Queue a key for the next warming cycle.
    pub fn warm(&self, resource: &str, key: &str) {
        self.warmer.enqueue_manual(resource, key);
    }

    /// Drop a cached entry. Returns whether something was removed.
    pub fn invalidate(&self, resource: &str, key: &str) -> bool {
        self.cache.delete(&composite_key(resource, key))
    }

    /// Run one warming cycle now; returns the number of tasks attempted.
    ///
    /// Skipped (returning 0) when a cycle is already in progress.
    #[tracing::instrument(skip(self))]
    pub async fn run_warming_cycle(&self) -> usize {
        if !self.warmer.try_begin_cycle() {
            debug!("Warming cycle already in progress, skipping");
            return 0;
        }
        let started = std::time::Instant::now();

        let expiring = self.cache.expiring(self.config.refresh_threshold);
        let tasks = build_worklist(
            &self.config.warm_list,
            self.warmer.drain_manual(),
            expiring,
            &self.popularity,
            self.config.max_queries_per_cycle,
        );
        let attempted = tasks.len();

        for task in tasks {
            let Some(loader) = self.loaders.get(&task.resource).map(|e| e.value().clone()) else {
                warn!(resource = %task.resource, key = %task.key, "No loader registered, skipping warm task");
                self.warmer.record_outcome(task.reason, false);
                continue;
            };

            let ctx = FetchContext::default().with_query(&task.key);
            let key = task.key.clone();
            let result = self
                .load_and_store(&task.resource, &task.key, &ctx, move || {
                    let loader = loader.clone();
                    let key = key.clone();
                    async move { loader.load(&key).await }
                })
                .await;

            let reason_label = match task.reason {
                WarmReason::Predefined => "predefined",
                WarmReason::Expiring => "expiring",
                WarmReason::Manual => "manual",
            };
            crate::metrics::record_warming_task(reason_label, result.is_ok());
            self.warmer.record_outcome(task.reason, result.is_ok());
            if let Err(error) = result {
                warn!(
                    resource = %task.resource,
                    key = %task.key,
                    %error,
                    "Warming task failed"
                );
            }
        }

        crate::metrics::record_warming_cycle(started.elapsed(), attempted);
        self.warmer.end_cycle();
        if attempted > 0 {
            info!(tasks = attempted, "Warming cycle complete");
        }
        attempted
    }

    /// Remove expired cache entries; returns how many were dropped.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired()
    }

    /// Push current occupancy readings to the metrics backend.
    pub fn update_gauge_metrics(&self) {
        let stats = self.cache.stats();
        crate::metrics::set_cache_stats(stats.entries, stats.total_bytes, stats.hit_rate);
        for (resource, _) in self.circuits.all() {
            let window = self.limiter.stats(&resource);
            crate::metrics::set_rate_window_requests(&resource, window.current_requests);
        }
    }

    // ─── Stats surfaces ────────────────────────────────────────────────

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    #[must_use]
    pub fn rate_limit_stats(&self, resource: &str) -> RateLimitStats {
        self.limiter.stats(resource)
    }

    /// Stats for every breaker instantiated so far.
    #[must_use]
    pub fn circuit_stats(&self) -> Vec<(String, CircuitStats)> {
        self.circuits
            .all()
            .into_iter()
            .map(|(resource, breaker)| (resource, breaker.stats()))
            .collect()
    }

    /// The breaker for a resource class, for manual overrides.
    #[must_use]
    pub fn circuit(&self, resource: &str) -> Arc<CircuitBreaker> {
        self.circuits.breaker(resource)
    }

    #[must_use]
    pub fn warming_stats(&self) -> WarmingStats {
        self.warmer.stats()
    }

    #[must_use]
    pub fn popularity_score(&self, query: &str) -> u64 {
        self.popularity.score(query)
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    #[must_use]
    pub fn config(&self) -> &ResilientClientConfig {
        &self.config
    }

    fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.config.sweep_interval_secs)
    }

    fn warming_interval(&self) -> Duration {
        Duration::from_secs(self.config.warming_interval_secs)
    }
}
