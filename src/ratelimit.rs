// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-resource sliding-window rate limiting.
//!
//! Each resource class owns an independent window of request timestamps plus
//! an optional `blocked_until` instant set when the remote itself reports a
//! rate limit. Admission runs three gates in order:
//!
//! 1. explicit block (remote-reported, fail fast until it lapses)
//! 2. sliding window (`max_requests` within `window`)
//! 3. per-second sub-window (`max_per_second` within the last 1000ms)
//!
//! The window and per-second gates are deliberately independent accounting;
//! a request can be denied by either while the other has headroom.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::RateLimitReason;

/// Sliding window state for one resource class.
#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl RateWindow {
    /// Drop timestamps that fell out of the window.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// How long until admission could succeed (zero when allowed)
    pub wait: Duration,
    /// Window slots still free after pruning (zero when denied)
    pub remaining: usize,
    pub reason: Option<RateLimitReason>,
}

impl RateDecision {
    fn allow(remaining: usize) -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
            remaining,
            reason: None,
        }
    }

    fn deny(wait: Duration, reason: RateLimitReason) -> Self {
        Self {
            allowed: false,
            wait,
            remaining: 0,
            reason: Some(reason),
        }
    }
}

/// Snapshot of one resource's window for the stats surface.
#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub current_requests: usize,
    pub is_blocked: bool,
    /// Age of the oldest in-window request
    pub oldest_request: Option<Duration>,
    /// Age of the most recent request
    pub newest_request: Option<Duration>,
}

/// Sliding-window + per-second admission control, independent per resource.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    configs: std::collections::HashMap<String, RateLimitConfig>,
    default_config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(
        configs: std::collections::HashMap<String, RateLimitConfig>,
        default_config: RateLimitConfig,
    ) -> Self {
        Self {
            windows: DashMap::new(),
            configs,
            default_config,
        }
    }

    fn config_for(&self, resource: &str) -> &RateLimitConfig {
        self.configs.get(resource).unwrap_or(&self.default_config)
    }

    /// Admission check without recording a request.
    pub fn check_limit(&self, resource: &str) -> RateDecision {
        let config = self.config_for(resource).clone();
        let mut window = self.windows.entry(resource.to_string()).or_default();
        Self::decide(&mut window, &config, Instant::now())
    }

    /// Record an admitted request against the resource's window.
    pub fn record_request(&self, resource: &str) {
        let mut window = self.windows.entry(resource.to_string()).or_default();
        window.timestamps.push_back(Instant::now());
    }

    /// Admission check that records the request when allowed, atomically
    /// with respect to other callers on the same resource.
    pub fn acquire(&self, resource: &str) -> RateDecision {
        let config = self.config_for(resource).clone();
        let mut window = self.windows.entry(resource.to_string()).or_default();
        let now = Instant::now();
        let decision = Self::decide(&mut window, &config, now);
        if decision.allowed {
            window.timestamps.push_back(now);
        } else {
            crate::metrics::record_rate_limit_denial(
                resource,
                decision.reason.map(|r| r.to_string()).unwrap_or_default(),
            );
        }
        decision
    }

    /// The remote reported a rate limit; fail local checks fast until it lapses.
    pub fn record_rejection(&self, resource: &str, retry_after: Duration) {
        let mut window = self.windows.entry(resource.to_string()).or_default();
        window.blocked_until = Some(Instant::now() + retry_after);
        warn!(
            resource,
            retry_after_ms = retry_after.as_millis() as u64,
            "Remote reported rate limit, blocking local admission"
        );
    }

    /// Suspend until admission succeeds, then record the request.
    ///
    /// Cancellation-safe: dropping the future while it sleeps releases
    /// nothing (no slot was taken yet).
    pub async fn wait_for_slot(&self, resource: &str) {
        loop {
            let decision = self.acquire(resource);
            if decision.allowed {
                return;
            }
            let wait = decision.wait.max(Duration::from_millis(10));
            debug!(
                resource,
                wait_ms = wait.as_millis() as u64,
                reason = %decision.reason.map(|r| r.to_string()).unwrap_or_default(),
                "Waiting for rate limit slot"
            );
            tokio::time::sleep(wait).await;
        }
    }

    #[must_use]
    pub fn stats(&self, resource: &str) -> RateLimitStats {
        let config = self.config_for(resource).clone();
        let now = Instant::now();

        match self.windows.get_mut(resource) {
            Some(mut window) => {
                window.prune(now, config.window());
                let is_blocked = window
                    .blocked_until
                    .map(|until| until > now)
                    .unwrap_or(false);
                RateLimitStats {
                    current_requests: window.timestamps.len(),
                    is_blocked,
                    oldest_request: window.timestamps.front().map(|t| now.duration_since(*t)),
                    newest_request: window.timestamps.back().map(|t| now.duration_since(*t)),
                }
            }
            None => RateLimitStats {
                current_requests: 0,
                is_blocked: false,
                oldest_request: None,
                newest_request: None,
            },
        }
    }

    fn decide(window: &mut RateWindow, config: &RateLimitConfig, now: Instant) -> RateDecision {
        // Gate 1: explicit block from a remote-reported rate limit
        if let Some(until) = window.blocked_until {
            if until > now {
                return RateDecision::deny(until - now, RateLimitReason::ExplicitBlock);
            }
            window.blocked_until = None;
        }

        window.prune(now, config.window());

        // Gate 2: sliding window occupancy
        if window.timestamps.len() >= config.max_requests {
            let wait = window
                .timestamps
                .front()
                .map(|oldest| config.window().saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(config.window());
            return RateDecision::deny(wait, RateLimitReason::WindowLimit);
        }

        // Gate 3: per-second sub-window
        let second = Duration::from_secs(1);
        let recent: Vec<&Instant> = window
            .timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < second)
            .collect();
        if recent.len() >= config.max_per_second {
            let wait = recent
                .last()
                .map(|newest| second.saturating_sub(now.duration_since(**newest)))
                .unwrap_or(second);
            return RateDecision::deny(wait, RateLimitReason::PerSecondLimit);
        }

        RateDecision::allow(config.max_requests.saturating_sub(window.timestamps.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn limiter(max_requests: usize, window_ms: u64, max_per_second: usize) -> RateLimiter {
        RateLimiter::new(
            HashMap::new(),
            RateLimitConfig {
                max_requests,
                window_ms,
                max_per_second,
            },
        )
    }

    #[test]
    fn test_allows_under_limit() {
        let limiter = limiter(10, 1000, 10);
        let decision = limiter.check_limit("search");
        assert!(decision.allowed);
        assert_eq!(decision.wait, Duration::ZERO);
        assert_eq!(decision.remaining, 10);

        limiter.record_request("search");
        assert_eq!(limiter.check_limit("search").remaining, 9);
    }

    #[test]
    fn test_window_limit_denies() {
        let limiter = limiter(10, 1000, 100);
        for _ in 0..10 {
            limiter.record_request("search");
        }

        let decision = limiter.check_limit("search");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(RateLimitReason::WindowLimit));
        assert!(decision.wait <= Duration::from_millis(1000));
    }

    #[test]
    fn test_window_frees_after_elapse() {
        let limiter = limiter(5, 50, 100);
        for _ in 0..5 {
            limiter.record_request("search");
        }
        assert!(!limiter.check_limit("search").allowed);

        std::thread::sleep(Duration::from_millis(60));
        let decision = limiter.check_limit("search");
        assert!(decision.allowed);
        // Window drained, so full capacity is back
        assert_eq!(decision.remaining, 5);
        // Stats prune too, so the window reads empty again
        assert_eq!(limiter.stats("search").current_requests, 0);
    }

    #[test]
    fn test_per_second_limit_independent_of_window() {
        // Window has plenty of headroom but per-second gate trips
        let limiter = limiter(1000, 60_000, 3);
        for _ in 0..3 {
            limiter.record_request("search");
        }

        let decision = limiter.check_limit("search");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(RateLimitReason::PerSecondLimit));
    }

    #[test]
    fn test_explicit_block_overrides_headroom() {
        let limiter = limiter(1000, 60_000, 100);
        limiter.record_rejection("search", Duration::from_secs(30));

        let decision = limiter.check_limit("search");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(RateLimitReason::ExplicitBlock));
        assert!(decision.wait > Duration::from_secs(29));
        assert!(limiter.stats("search").is_blocked);
    }

    #[test]
    fn test_expired_block_clears() {
        let limiter = limiter(1000, 60_000, 100);
        limiter.record_rejection("search", Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));

        assert!(limiter.check_limit("search").allowed);
        assert!(!limiter.stats("search").is_blocked);
    }

    #[test]
    fn test_resources_are_isolated() {
        let limiter = limiter(2, 60_000, 100);
        limiter.record_request("search");
        limiter.record_request("search");

        assert!(!limiter.check_limit("search").allowed);
        assert!(limiter.check_limit("social").allowed);

        limiter.record_rejection("social", Duration::from_secs(60));
        assert_eq!(
            limiter.check_limit("social").reason,
            Some(RateLimitReason::ExplicitBlock)
        );
        assert_eq!(
            limiter.check_limit("search").reason,
            Some(RateLimitReason::WindowLimit)
        );
    }

    #[test]
    fn test_acquire_records_on_allow() {
        let limiter = limiter(3, 60_000, 100);
        assert!(limiter.acquire("search").allowed);
        assert!(limiter.acquire("search").allowed);
        assert!(limiter.acquire("search").allowed);
        assert!(!limiter.acquire("search").allowed);
        assert_eq!(limiter.stats("search").current_requests, 3);
    }

    #[tokio::test]
    async fn test_wait_for_slot_suspends_then_admits() {
        let limiter = limiter(2, 40, 100);
        limiter.record_request("search");
        limiter.record_request("search");

        let start = Instant::now();
        limiter.wait_for_slot("search").await;
        // Must have waited for the window to free up
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(limiter.stats("search").current_requests, 1);
    }

    #[test]
    fn test_stats_ages() {
        let limiter = limiter(10, 60_000, 100);
        limiter.record_request("search");
        std::thread::sleep(Duration::from_millis(10));
        limiter.record_request("search");

        let stats = limiter.stats("search");
        assert_eq!(stats.current_requests, 2);
        assert!(stats.oldest_request.unwrap() >= stats.newest_request.unwrap());
    }
}
