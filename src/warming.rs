// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background cache warming.
//!
//! Each cycle assembles a worklist from three sources, in priority order:
//! operator-predefined targets, manually queued requests, then cached
//! entries nearing expiry. Expiring entries are refreshed only when their
//! query is popular, hottest first. The list is capped per cycle so warming
//! never floods the rate limiter. Only one cycle runs at a time; an
//! overlapping trigger is skipped, not queued.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

use crate::cache::ExpiringEntry;
use crate::config::WarmTarget;
use crate::popularity::PopularityTracker;

/// Why a key landed on the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmReason {
    /// From the operator's configured warm list
    Predefined,
    /// Cached entry close to expiry
    Expiring,
    /// Explicitly requested via the warming API
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmingTask {
    pub resource: String,
    pub key: String,
    pub reason: WarmReason,
}

/// Counters and cycle status for the stats surface.
#[derive(Debug, Clone)]
pub struct WarmingStats {
    /// Predefined and manual warms completed
    pub total_warmed: u64,
    /// Near-expiry refreshes completed
    pub total_refreshed: u64,
    pub failed_warmings: u64,
    pub last_cycle_at: Option<Instant>,
    pub in_progress: bool,
    /// Manually queued keys waiting for the next cycle
    pub active_queries: usize,
}

/// Shared state between the warming loop and the public API.
pub struct WarmerState {
    in_progress: AtomicBool,
    manual_queue: Mutex<Vec<WarmingTask>>,
    total_warmed: AtomicU64,
    total_refreshed: AtomicU64,
    failed_warmings: AtomicU64,
    last_cycle_at: Mutex<Option<Instant>>,
}

impl Default for WarmerState {
    fn default() -> Self {
        Self::new()
    }
}

impl WarmerState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            manual_queue: Mutex::new(Vec::new()),
            total_warmed: AtomicU64::new(0),
            total_refreshed: AtomicU64::new(0),
            failed_warmings: AtomicU64::new(0),
            last_cycle_at: Mutex::new(None),
        }
    }

    /// Claim the cycle slot. Returns false if a cycle is already running.
    pub fn try_begin_cycle(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_cycle(&self) {
        *self.last_cycle_at.lock() = Some(Instant::now());
        self.in_progress.store(false, Ordering::Release);
    }

    pub fn enqueue_manual(&self, resource: &str, key: &str) {
        self.manual_queue.lock().push(WarmingTask {
            resource: resource.to_string(),
            key: key.to_string(),
            reason: WarmReason::Manual,
        });
    }

    pub fn drain_manual(&self) -> Vec<WarmingTask> {
        std::mem::take(&mut *self.manual_queue.lock())
    }

    pub fn record_outcome(&self, reason: WarmReason, succeeded: bool) {
        if !succeeded {
            self.failed_warmings.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match reason {
            WarmReason::Expiring => {
                self.total_refreshed.fetch_add(1, Ordering::Relaxed);
            }
            WarmReason::Predefined | WarmReason::Manual => {
                self.total_warmed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> WarmingStats {
        WarmingStats {
            total_warmed: self.total_warmed.load(Ordering::Relaxed),
            total_refreshed: self.total_refreshed.load(Ordering::Relaxed),
            failed_warmings: self.failed_warmings.load(Ordering::Relaxed),
            last_cycle_at: *self.last_cycle_at.lock(),
            in_progress: self.in_progress.load(Ordering::Acquire),
            active_queries: self.manual_queue.lock().len(),
        }
    }
}

/// Assemble one cycle's worklist.
///
/// Expiring entries are admitted only when their query clears the
/// popularity threshold, then ordered hottest first (lower remaining
/// fraction breaking ties). Deduplicates by composite key, keeping the
/// first (highest-priority) occurrence, and truncates to `max_per_cycle`.
pub fn build_worklist(
    predefined: &[WarmTarget],
    manual: Vec<WarmingTask>,
    expiring: Vec<ExpiringEntry>,
    popularity: &PopularityTracker,
    max_per_cycle: usize,
) -> Vec<WarmingTask> {
    let mut tasks: Vec<WarmingTask> = Vec::new();

    for target in predefined {
        tasks.push(WarmingTask {
            resource: target.resource.clone(),
            key: target.key.clone(),
            reason: WarmReason::Predefined,
        });
    }
    tasks.extend(manual);

    // Cache keys are "resource:key"; popularity is tracked by the key part
    let mut refreshable: Vec<(String, String, f64, u64)> = expiring
        .into_iter()
        .filter_map(|entry| {
            let (resource, key) = entry.key.split_once(':')?;
            if !popularity.is_popular(key) {
                return None;
            }
            let score = popularity.score(key);
            Some((
                resource.to_string(),
                key.to_string(),
                entry.remaining_fraction,
                score,
            ))
        })
        .collect();
    refreshable.sort_by(|a, b| {
        b.3.cmp(&a.3).then_with(|| {
            a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal)
        })
    });
    for (resource, key, _, _) in refreshable {
        tasks.push(WarmingTask {
            resource,
            key,
            reason: WarmReason::Expiring,
        });
    }

    let mut seen = std::collections::HashSet::new();
    tasks.retain(|task| seen.insert((task.resource.clone(), task.key.clone())));
    tasks.truncate(max_per_cycle);

    debug!(tasks = tasks.len(), "Built warming worklist");
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expiring(key: &str, remaining: f64) -> ExpiringEntry {
        ExpiringEntry {
            key: key.to_string(),
            remaining_fraction: remaining,
            access_count: 0,
        }
    }

    #[test]
    fn test_cycle_guard_is_exclusive() {
        let state = WarmerState::new();
        assert!(state.try_begin_cycle());
        assert!(!state.try_begin_cycle());
        state.end_cycle();
        assert!(state.try_begin_cycle());
        assert!(state.stats().last_cycle_at.is_some());
    }

    #[test]
    fn test_manual_queue_drains_once() {
        let state = WarmerState::new();
        state.enqueue_manual("search", "rust");
        state.enqueue_manual("docs", "tokio");
        assert_eq!(state.stats().active_queries, 2);

        let drained = state.drain_manual();
        assert_eq!(drained.len(), 2);
        assert!(state.drain_manual().is_empty());
    }

    #[test]
    fn test_outcome_counters() {
        let state = WarmerState::new();
        state.record_outcome(WarmReason::Predefined, true);
        state.record_outcome(WarmReason::Manual, true);
        state.record_outcome(WarmReason::Expiring, true);
        state.record_outcome(WarmReason::Expiring, false);

        let stats = state.stats();
        assert_eq!(stats.total_warmed, 2);
        assert_eq!(stats.total_refreshed, 1);
        assert_eq!(stats.failed_warmings, 1);
    }

    #[test]
    fn test_worklist_priority_order() {
        let popularity = PopularityTracker::new(3);
        for _ in 0..3 {
            popularity.record("old");
        }
        let predefined = vec![WarmTarget {
            resource: "search".into(),
            key: "rust".into(),
        }];
        let manual = vec![WarmingTask {
            resource: "docs".into(),
            key: "tokio".into(),
            reason: WarmReason::Manual,
        }];
        let expiring = vec![expiring("search:old", 0.1)];

        let tasks = build_worklist(&predefined, manual, expiring, &popularity, 10);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].reason, WarmReason::Predefined);
        assert_eq!(tasks[1].reason, WarmReason::Manual);
        assert_eq!(tasks[2].reason, WarmReason::Expiring);
        assert_eq!(tasks[2].key, "old");
    }

    #[test]
    fn test_expiring_sorted_by_popularity() {
        let popularity = PopularityTracker::new(1);
        for _ in 0..5 {
            popularity.record("hot");
        }
        popularity.record("warm");

        let tasks = build_worklist(
            &[],
            Vec::new(),
            vec![
                expiring("search:cold", 0.05),
                expiring("search:hot", 0.2),
                expiring("search:warm", 0.1),
            ],
            &popularity,
            10,
        );
        // "cold" never crossed the popularity threshold, so it is skipped
        let keys: Vec<&str> = tasks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["hot", "warm"]);
    }

    #[test]
    fn test_unpopular_expiring_entries_not_refreshed() {
        let popularity = PopularityTracker::new(3);
        popularity.record("seen-twice");
        popularity.record("seen-twice");

        let tasks = build_worklist(
            &[],
            Vec::new(),
            vec![expiring("search:seen-twice", 0.1)],
            &popularity,
            10,
        );
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_worklist_dedupes_and_truncates() {
        // Threshold zero admits every expiring entry
        let popularity = PopularityTracker::new(0);
        let predefined = vec![WarmTarget {
            resource: "search".into(),
            key: "rust".into(),
        }];
        let manual = vec![WarmingTask {
            resource: "search".into(),
            key: "rust".into(),
            reason: WarmReason::Manual,
        }];
        let expiring = (0..20).map(|i| expiring(&format!("search:q{i}"), 0.1)).collect();

        let tasks = build_worklist(&predefined, manual, expiring, &popularity, 5);
        assert_eq!(tasks.len(), 5);
        // Duplicate keeps the predefined (higher-priority) occurrence
        assert_eq!(tasks[0].reason, WarmReason::Predefined);
        assert!(tasks.iter().filter(|t| t.key == "rust").count() == 1);
    }

    #[test]
    fn test_malformed_cache_key_skipped() {
        let popularity = PopularityTracker::new(0);
        let tasks = build_worklist(
            &[],
            Vec::new(),
            vec![expiring("no-separator", 0.1)],
            &popularity,
            10,
        );
        assert!(tasks.is_empty());
    }
}
