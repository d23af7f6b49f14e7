//! Bounded key/value cache with per-entry expiry and LRU eviction.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Cache Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  store.rs  - CacheStore                                      │
//! │  └─ DashMap of entries, byte-capacity bound                  │
//! │  └─ Lazy expiry on get + periodic sweep                      │
//! │  └─ LRU eviction (oldest last_accessed first) on insert      │
//! │  └─ Hit/miss counters for hit-rate reporting                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expired entries behave as misses and are deleted on read; the owning
//! client additionally runs [`CacheStore::sweep_expired`] on an interval so
//! memory is reclaimed even for keys nobody reads again.

pub mod store;

pub use store::{CacheStats, CacheStore, ExpiringEntry};
