// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Failure containment for outbound calls.
//!
//! ```text
//!              ┌──────────────────┐
//!   request ──▶│  CircuitBreaker  │── open ──▶ fail fast
//!              └────────┬─────────┘
//!                       │ closed / probing
//!                       ▼
//!              ┌──────────────────┐
//!              │ RetryController  │── backoff + jitter per attempt
//!              └────────┬─────────┘
//!                       │ each outcome classified
//!                       ▼
//!              ┌──────────────────┐
//!              │ ErrorClassifier  │── retryable? honor retry-after?
//!              └──────────────────┘
//! ```
//!
//! The breaker decides whether to try at all; the retry controller decides
//! how many times and with what spacing; the classifier decides which
//! failures deserve another attempt.

pub mod circuit_breaker;
pub mod classifier;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitRegistry, CircuitState, CircuitStats};
pub use classifier::{ErrorClassifier, StandardClassifier};
pub use retry::{retry, RetryConfig};
