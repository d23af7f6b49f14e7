// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Three-state circuit breaker, one per resource class.
//!
//! CLOSED counts failures inside a sliding window; crossing the threshold
//! trips to OPEN. OPEN rejects immediately until the reset timeout lapses,
//! after which the first acquisition transitions to HALF_OPEN. HALF_OPEN
//! admits probes: enough consecutive successes close the circuit, any
//! failure reopens it.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Windowed failures that trip CLOSED -> OPEN
    pub failure_threshold: usize,
    /// Consecutive HALF_OPEN successes that close the circuit
    pub success_threshold: usize,
    /// How long OPEN rejects before probing
    pub reset_timeout: Duration,
    /// Sliding window for failure counting
    pub window: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            window: Duration::from_secs(60),
        }
    }
}

impl CircuitConfig {
    /// Trips early and recovers slowly, for flaky upstreams.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            window: Duration::from_secs(30),
        }
    }

    /// Tolerates more failures before tripping.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(10),
            window: Duration::from_secs(120),
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub windowed_failures: usize,
    /// Consecutive HALF_OPEN probe successes so far
    pub half_open_successes: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    pub rejections: u64,
    pub last_failure_at: Option<Instant>,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    half_open_successes: usize,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
}

pub struct CircuitBreaker {
    resource: String,
    config: CircuitConfig,
    inner: Mutex<BreakerInner>,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(resource: &str, config: CircuitConfig) -> Self {
        Self {
            resource: resource.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                half_open_successes: 0,
                opened_at: None,
                last_failure_at: None,
            }),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Ask permission to issue a request.
    ///
    /// OPEN transitions to HALF_OPEN here once the reset timeout has lapsed,
    /// so recovery probing needs no background task.
    pub fn try_acquire(&self) -> Result<(), FetchError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|at| now.duration_since(at));
            match elapsed {
                Some(e) if e >= self.config.reset_timeout => {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                }
                _ => {
                    self.rejections.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_circuit_rejection(&self.resource);
                    let retry_after = inner
                        .opened_at
                        .map(|at| self.config.reset_timeout.saturating_sub(now.duration_since(at)));
                    return Err(FetchError::CircuitOpen {
                        resource: self.resource.clone(),
                        retry_after,
                    });
                }
            }
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                debug!(
                    resource = %self.resource,
                    successes = inner.half_open_successes,
                    needed = self.config.success_threshold,
                    "Probe succeeded"
                );
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                // A success clears the failure window but keeps last_failure_at
                // for the stats surface.
                inner.failures.clear();
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                let window = self.config.window;
                while let Some(&front) = inner.failures.front() {
                    if now.duration_since(front) >= window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() >= self.config.failure_threshold {
                    warn!(
                        resource = %self.resource,
                        failures = inner.failures.len(),
                        window_secs = self.config.window.as_secs(),
                        "Failure threshold crossed, tripping circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(resource = %self.resource, "Probe failed, reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Operator override: reject everything until forced closed or reset.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Operator override: admit everything, clearing accumulated failures.
    pub fn force_closed(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Back to a pristine CLOSED state, counters included.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.half_open_successes = 0;
        inner.opened_at = None;
        inner.last_failure_at = None;
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
        info!(resource = %self.resource, "Circuit breaker reset");
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            state: inner.state,
            windowed_failures: inner.failures.len(),
            half_open_successes: inner.half_open_successes,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            last_failure_at: inner.last_failure_at,
            opened_at: inner.opened_at,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes = 0;
            }
            CircuitState::Closed => {
                inner.failures.clear();
                inner.opened_at = None;
                inner.half_open_successes = 0;
            }
        }
        info!(
            resource = %self.resource,
            from = %from,
            to = %to,
            "Circuit state transition"
        );
        crate::metrics::record_circuit_transition(&self.resource, from, to);
    }
}

/// One breaker per resource class, created on first use.
pub struct CircuitRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitConfig,
}

impl CircuitRegistry {
    #[must_use]
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    pub fn breaker(&self, resource: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(resource, self.config.clone())))
            .clone()
    }

    /// Breakers instantiated so far, for the stats surface.
    pub fn all(&self) -> Vec<(String, Arc<CircuitBreaker>)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
