// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff and jitter.
//!
//! Delays grow as `initial * multiplier^attempt`, capped at `max_delay`,
//! then jittered by a uniform factor in [0.5, 1.5] so synchronized callers
//! don't retry in lockstep. A server-directed retry-after wins over the
//! computed delay, capped at `max_delay`.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use super::classifier::ErrorClassifier;
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first (so 3 means up to 4 calls)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Short delays for tests and latency-sensitive paths.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Jittered delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay);
        let jitter = 0.5 + fastrand::f64();
        exp.mul_f64(jitter)
    }
}

/// Run `operation` until it succeeds, the classifier rules the failure
/// permanent, or retries are exhausted.
///
/// The closure receives the zero-based attempt number. Exhaustion wraps the
/// final failure in [`FetchError::RetriesExhausted`]; a non-retryable error
/// propagates unwrapped.
pub async fn retry<T, F, Fut>(
    label: &str,
    config: &RetryConfig,
    classifier: &dyn ErrorClassifier,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    info!(label, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !classifier.is_retryable(&error) {
                    warn!(label, attempt, %error, "Non-retryable failure");
                    return Err(error);
                }
                if attempt >= config.max_retries {
                    warn!(
                        label,
                        attempts = attempt + 1,
                        %error,
                        "Retries exhausted"
                    );
                    crate::metrics::record_retry_exhausted(label);
                    return Err(FetchError::RetriesExhausted {
                        label: label.to_string(),
                        attempts: attempt + 1,
                        last: Box::new(error),
                    });
                }

                // A server-directed delay wins over computed backoff but is
                // still capped; waits beyond max_delay belong to the rate
                // limiter's block, not this loop.
                let delay = classifier
                    .retry_after(&error)
                    .unwrap_or_else(|| config.backoff_delay(attempt))
                    .min(config.max_delay);
                info!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Retrying after failure"
                );
                crate::metrics::record_retry_attempt(label);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
