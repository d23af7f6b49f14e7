// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilient outbound-call layer: cache-first fetches with adaptive TTLs,
//! per-resource rate limiting, circuit breaking, retries and background
//! cache warming.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ResilientClient                        │
//! │                                                             │
//! │  fetch ──▶ CacheStore ──miss──▶ RateLimiter ──▶ Retry       │
//! │               ▲                                  │          │
//! │               │                           CircuitBreaker    │
//! │          TtlEngine ◀── loader result ◀────── loader call    │
//! │                                                             │
//! │  background: sweep loop · warming loop (popularity-driven)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use resilient_client::{FetchError, ResilientClient, ResilientClientConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), FetchError> {
//! let client = ResilientClient::new(ResilientClientConfig::default());
//!
//! let results = client
//!     .fetch("search", "rust async runtime", || async {
//!         // call the real backend here
//!         Ok(json!(["result one", "result two"]))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod popularity;
pub mod ratelimit;
pub mod resilience;
pub mod ttl;
pub mod warming;

pub use cache::{CacheStats, CacheStore};
pub use client::{ClientState, FetchContext, Loader, ResilientClient};
pub use config::{RateLimitConfig, ResilientClientConfig, WarmTarget};
pub use error::{FetchError, RateLimitReason};
pub use ratelimit::{RateLimitStats, RateLimiter};
pub use resilience::{
    CircuitBreaker, CircuitConfig, CircuitState, ErrorClassifier, RetryConfig, StandardClassifier,
};
pub use ttl::{TtlContext, TtlEngine, TtlStrategy};
pub use warming::WarmingStats;
