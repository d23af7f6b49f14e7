// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::FetchError;

/// A single cached value with its expiry and access metadata.
///
/// Invariant: `expires_at > created_at`, and `size_bytes` is the serialized
/// JSON length of `value`.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    size_bytes: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Fraction of the entry's TTL still remaining (0.0 when expired).
    fn remaining_fraction(&self, now: Instant) -> f64 {
        let total = self.expires_at.saturating_duration_since(self.created_at);
        if total.is_zero() {
            return 0.0;
        }
        let remaining = self.expires_at.saturating_duration_since(now);
        remaining.as_secs_f64() / total.as_secs_f64()
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    /// hits / (hits + misses), 0.0 before any lookup
    pub hit_rate: f64,
    /// Age of the oldest live entry
    pub oldest_entry: Option<Duration>,
    /// Age of the newest live entry
    pub newest_entry: Option<Duration>,
}

/// A live entry nearing expiry, reported to the cache warmer.
#[derive(Debug, Clone)]
pub struct ExpiringEntry {
    pub key: String,
    pub remaining_fraction: f64,
    pub access_count: u64,
}

/// Byte-bounded in-memory cache with per-entry TTL and true LRU eviction.
///
/// Reads proceed lock-free on the sharded map. Writers serialize their
/// check-evict-insert sequence through `admission`, so the capacity bound
/// holds under concurrent `set` calls; expiry removals on the read path only
/// shrink the total and need no coordination.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    capacity_bytes: usize,
    total_bytes: AtomicUsize,
    admission: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity_bytes,
            total_bytes: AtomicUsize::new(0),
            admission: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a value. Expired entries count as misses and are removed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired(now) {
                drop(entry);
                // Re-check under the removal so a concurrent replacement
                // isn't torn out with the stale entry's size
                if let Some((_, removed)) = self.entries.remove_if(key, |_, e| e.is_expired(now)) {
                    self.sub_bytes(removed.size_bytes);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Expired entry removed on read");
                crate::metrics::record_cache_lookup("expired");
                return None;
            }

            entry.access_count = entry.access_count.saturating_add(1);
            entry.last_accessed = now;
            self.hits.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_lookup("hit");
            return Some(entry.value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup("miss");
        None
    }

    /// Insert a value with the given TTL, evicting LRU entries if needed.
    ///
    /// Fails with [`FetchError::EntryTooLarge`] when the serialized value
    /// alone exceeds the store's capacity.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), FetchError> {
        let size_bytes = serialized_size(&value);
        if size_bytes > self.capacity_bytes {
            return Err(FetchError::EntryTooLarge {
                size_bytes,
                capacity_bytes: self.capacity_bytes,
            });
        }

        // One writer at a time through check-evict-insert: two sets racing
        // past the headroom check would both insert and overshoot capacity
        let _guard = self.admission.lock();

        // Replacing an existing entry releases its bytes first
        if let Some((_, old)) = self.entries.remove(key) {
            self.sub_bytes(old.size_bytes);
        }

        if self.total_bytes.load(Ordering::Acquire) + size_bytes > self.capacity_bytes {
            self.evict_lru(size_bytes);
        }

        let now = Instant::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now + ttl,
            last_accessed: now,
            access_count: 0,
            size_bytes,
        };
        self.entries.insert(key.to_string(), entry);
        self.total_bytes.fetch_add(size_bytes, Ordering::Release);
        debug!(key, size_bytes, ttl_secs = ttl.as_secs(), "Cached entry");
        Ok(())
    }

    /// Remove an entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.sub_bytes(entry.size_bytes);
            true
        } else {
            false
        }
    }

    /// Whether a live (non-expired) entry exists. Does not touch access metadata.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, usize)> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| (e.key().clone(), e.value().size_bytes))
            .collect();

        let mut removed = 0;
        for (key, _) in expired {
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.is_expired(now)) {
                self.sub_bytes(entry.size_bytes);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Expiry sweep reclaimed entries");
            crate::metrics::record_cache_sweep(removed);
        }
        removed
    }

    /// Live entries whose remaining TTL fraction is below `threshold`.
    #[must_use]
    pub fn expiring(&self, threshold: f64) -> Vec<ExpiringEntry> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .filter(|e| e.value().remaining_fraction(now) < threshold)
            .map(|e| ExpiringEntry {
                key: e.key().clone(),
                remaining_fraction: e.value().remaining_fraction(now),
                access_count: e.value().access_count,
            })
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let now = Instant::now();

        let mut oldest: Option<Duration> = None;
        let mut newest: Option<Duration> = None;
        for entry in self.entries.iter() {
            let age = now.saturating_duration_since(entry.value().created_at);
            if oldest.map_or(true, |o| age > o) {
                oldest = Some(age);
            }
            if newest.map_or(true, |n| age < n) {
                newest = Some(age);
            }
        }

        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes.load(Ordering::Acquire),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let _guard = self.admission.lock();
        self.entries.clear();
        self.total_bytes.store(0, Ordering::Release);
    }

    /// Evict in ascending `last_accessed` order until `needed_bytes` fits.
    fn evict_lru(&self, needed_bytes: usize) {
        let mut candidates: Vec<(String, Instant, usize)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().last_accessed, e.value().size_bytes))
            .collect();
        candidates.sort_by_key(|(_, last_accessed, _)| *last_accessed);

        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        for (key, _, _) in candidates {
            if self.total_bytes.load(Ordering::Acquire) + needed_bytes <= self.capacity_bytes {
                break;
            }
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.sub_bytes(entry.size_bytes);
                evicted += 1;
                evicted_bytes += entry.size_bytes;
            }
        }

        if evicted > 0 {
            info!(evicted, evicted_bytes, needed_bytes, "Evicted LRU entries to make room");
            crate::metrics::record_cache_eviction(evicted, evicted_bytes);
        }
    }

    /// Saturating atomic decrement; a plain load/store pair would lose
    /// concurrent decrements from the read-side expiry path.
    fn sub_bytes(&self, size: usize) {
        let mut current = self.total_bytes.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(size);
            match self.total_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Serialized JSON size of a value, used for capacity accounting.
fn serialized_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let store = CacheStore::new(1024 * 1024);
        store
            .set("k1", json!({"a": 1}), Duration::from_secs(60))
            .unwrap();

        let value = store.get("k1").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_get_missing_is_miss() {
        let store = CacheStore::new(1024);
        assert!(store.get("nope").is_none());
        let stats = store.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_expired_entry_is_miss_and_removed() {
        let store = CacheStore::new(1024);
        store.set("k1", json!(1), Duration::from_millis(0)).unwrap();

        assert!(store.get("k1").is_none());
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().total_bytes, 0);
    }

    #[test]
    fn test_entry_too_large_rejected() {
        let store = CacheStore::new(8);
        let err = store
            .set("big", json!("a very large string value"), Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, FetchError::EntryTooLarge { .. }));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_lru_eviction_keeps_recently_used() {
        // Each entry is 4 bytes ("111x" as numbers serialize short); use
        // strings of known size instead: "xxxx" serializes to 6 bytes.
        let store = CacheStore::new(20);
        store.set("a", json!("xxxx"), Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.set("b", json!("xxxx"), Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.set("c", json!("xxxx"), Duration::from_secs(60)).unwrap();

        // Touch "a" so "b" becomes the LRU victim
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get("a").is_some());

        // 4th entry forces eviction (capacity 20, 4 x 6 = 24)
        store.set("d", json!("xxxx"), Duration::from_secs(60)).unwrap();

        assert!(store.has("a"));
        assert!(!store.has("b"));
        assert!(store.has("d"));
    }

    #[test]
    fn test_capacity_invariant_holds() {
        let store = CacheStore::new(64);
        for i in 0..50 {
            store
                .set(&format!("k{}", i), json!("xxxxxxxx"), Duration::from_secs(60))
                .unwrap();
            assert!(store.stats().total_bytes <= 64);
        }
    }

    #[test]
    fn test_replace_updates_size_accounting() {
        let store = CacheStore::new(1024);
        store.set("k", json!("aa"), Duration::from_secs(60)).unwrap();
        let small = store.stats().total_bytes;
        store
            .set("k", json!("aaaaaaaaaaaaaaaa"), Duration::from_secs(60))
            .unwrap();
        let big = store.stats().total_bytes;
        assert_eq!(store.len(), 1);
        assert!(big > small);

        store.set("k", json!("aa"), Duration::from_secs(60)).unwrap();
        assert_eq!(store.stats().total_bytes, small);
    }

    #[test]
    fn test_delete() {
        let store = CacheStore::new(1024);
        store.set("k", json!(1), Duration::from_secs(60)).unwrap();
        assert!(store.delete("k"));
        assert!(!store.delete("k"));
        assert_eq!(store.stats().total_bytes, 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = CacheStore::new(1024);
        store.set("stale", json!(1), Duration::from_millis(0)).unwrap();
        store.set("live", json!(2), Duration::from_secs(60)).unwrap();

        let removed = store.sweep_expired();
        assert_eq!(removed, 1);
        assert!(store.has("live"));
        assert!(!store.has("stale"));
    }

    #[test]
    fn test_hit_rate() {
        let store = CacheStore::new(1024);
        store.set("k", json!(1), Duration::from_secs(60)).unwrap();

        store.get("k");
        store.get("k");
        store.get("k");
        store.get("absent");

        let stats = store.stats();
        assert!((stats.hit_rate - 0.75).abs() < 0.01);
    }

    #[test]
    fn test_expiring_reports_low_remaining_fraction() {
        let store = CacheStore::new(1024);
        store.set("short", json!(1), Duration::from_millis(40)).unwrap();
        store.set("long", json!(2), Duration::from_secs(3600)).unwrap();

        std::thread::sleep(Duration::from_millis(35));

        let expiring = store.expiring(0.25);
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].key, "short");
        assert!(expiring[0].remaining_fraction < 0.25);
    }

    #[test]
    fn test_oldest_newest_ages() {
        let store = CacheStore::new(1024);
        store.set("old", json!(1), Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        store.set("new", json!(2), Duration::from_secs(60)).unwrap();

        let stats = store.stats();
        assert!(stats.oldest_entry.unwrap() >= stats.newest_entry.unwrap());
    }

    #[test]
    fn test_concurrent_writers_never_exceed_capacity() {
        use std::sync::Arc;

        // Entries around 80 bytes against a 2000-byte store keep eviction
        // busy while eight writers race the admission path
        let store = Arc::new(CacheStore::new(2000));
        let mut handles = vec![];

        for batch in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("w{}-{}", batch, i);
                    store
                        .set(&key, json!({"pad": "x".repeat(60), "i": i}), Duration::from_secs(60))
                        .unwrap();
                    assert!(store.stats().total_bytes <= 2000);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.stats().total_bytes <= 2000);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(CacheStore::new(1024 * 1024));
        let mut handles = vec![];

        for batch in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("batch-{}-{}", batch, i);
                    store.set(&key, json!({"i": i}), Duration::from_secs(60)).unwrap();
                    assert!(store.get(&key).is_some());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
