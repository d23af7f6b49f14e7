// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Decides which failures are worth another attempt.

use std::time::Duration;

use crate::error::FetchError;

/// Classification seam between the retry controller and concrete failures.
///
/// Implementations must be cheap; classification runs on every failed
/// attempt.
pub trait ErrorClassifier: Send + Sync {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self, error: &FetchError) -> bool;

    /// A server-directed delay overriding computed backoff, if any.
    fn retry_after(&self, error: &FetchError) -> Option<Duration>;
}

/// Default classification:
///
/// - network faults, timeouts, 5xx responses and upstream rate limits are
///   transient and retryable
/// - authentication failures, 4xx responses and unclassified errors are
///   permanent for the life of this request
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardClassifier;

impl ErrorClassifier for StandardClassifier {
    fn is_retryable(&self, error: &FetchError) -> bool {
        match error {
            FetchError::Network(_) | FetchError::Timeout { .. } => true,
            FetchError::Upstream { status, .. } => *status >= 500,
            FetchError::RateLimited { .. } => true,
            FetchError::Authentication(_)
            | FetchError::Unknown(_)
            | FetchError::EntryTooLarge { .. }
            | FetchError::CircuitOpen { .. }
            | FetchError::RetriesExhausted { .. } => false,
        }
    }

    fn retry_after(&self, error: &FetchError) -> Option<Duration> {
        match error {
            FetchError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
