// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query popularity tracking.
//!
//! Counts how often each normalized query is fetched so the TTL engine can
//! extend hot entries and the warmer can prioritize them. Each record also
//! keeps a small ring of recent observation instants; recency breaks ties
//! when the table outgrows its capacity and the coldest half is dropped.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 1024;
const RECENT_RING_SIZE: usize = 32;

/// Lowercased, whitespace-collapsed form used as the counting key.
#[must_use]
pub fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Default)]
struct PopularityRecord {
    count: u64,
    recent: VecDeque<Instant>,
}

impl PopularityRecord {
    fn observe(&mut self, now: Instant) -> u64 {
        self.count += 1;
        if self.recent.len() == RECENT_RING_SIZE {
            self.recent.pop_front();
        }
        self.recent.push_back(now);
        self.count
    }

    fn last_seen(&self) -> Option<Instant> {
        self.recent.back().copied()
    }
}

pub struct PopularityTracker {
    records: DashMap<String, PopularityRecord>,
    capacity: usize,
    min_popularity_score: u64,
    prune_lock: Mutex<()>,
}

impl PopularityTracker {
    #[must_use]
    pub fn new(min_popularity_score: u64) -> Self {
        Self::with_capacity(min_popularity_score, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(min_popularity_score: u64, capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            capacity: capacity.max(2),
            min_popularity_score,
            prune_lock: Mutex::new(()),
        }
    }

    /// Count one observation and return the updated score.
    pub fn record(&self, query: &str) -> u64 {
        let key = normalize(query);
        let score = self.records.entry(key).or_default().observe(Instant::now());
        if self.records.len() > self.capacity {
            self.prune();
        }
        score
    }

    #[must_use]
    pub fn score(&self, query: &str) -> u64 {
        self.records.get(&normalize(query)).map(|r| r.count).unwrap_or(0)
    }

    #[must_use]
    pub fn is_popular(&self, query: &str) -> bool {
        self.score(query) >= self.min_popularity_score
    }

    /// Observations of this query within the trailing window (ring-bounded).
    #[must_use]
    pub fn recent_count(&self, query: &str, within: Duration) -> usize {
        let now = Instant::now();
        self.records
            .get(&normalize(query))
            .map(|r| {
                r.recent
                    .iter()
                    .filter(|t| now.duration_since(**t) <= within)
                    .count()
            })
            .unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop the coldest half of the table: lowest count first, least
    /// recently seen breaking ties.
    fn prune(&self) {
        // One pruner at a time; others racing here would double-drop
        let Some(_guard) = self.prune_lock.try_lock() else {
            return;
        };
        if self.records.len() <= self.capacity {
            return;
        }

        let mut scored: Vec<(String, u64, Option<Instant>)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().count, entry.value().last_seen()))
            .collect();
        scored.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let to_drop = scored.len() / 2;
        for (key, _, _) in scored.into_iter().take(to_drop) {
            self.records.remove(&key);
        }
        debug!(dropped = to_drop, remaining = self.records.len(), "Pruned popularity table");
    }
}
