//! Error taxonomy for the resilient call path.
//!
//! Local denials (cache, rate limiter, circuit breaker) are distinct variants
//! from loader failures so callers can tell "we refused to call" apart from
//! "the remote call failed".

use std::time::Duration;
use thiserror::Error;

/// Why the rate limiter denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// `blocked_until` is set (remote previously reported a rate limit)
    ExplicitBlock,
    /// Sliding-window request count reached the configured maximum
    WindowLimit,
    /// Per-second sub-window reached the configured maximum
    PerSecondLimit,
    /// The remote dependency itself reported a rate limit (e.g. HTTP 429)
    Upstream,
}

impl std::fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExplicitBlock => write!(f, "explicit block"),
            Self::WindowLimit => write!(f, "window limit"),
            Self::PerSecondLimit => write!(f, "per-second limit"),
            Self::Upstream => write!(f, "upstream rate limit"),
        }
    }
}

/// Error type for `fetch` and everything beneath it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The serialized value exceeds the cache store's total capacity
    #[error("cache entry of {size_bytes} bytes exceeds capacity of {capacity_bytes} bytes")]
    EntryTooLarge {
        size_bytes: usize,
        capacity_bytes: usize,
    },

    /// Denied by the rate limiter (local) or reported by the remote (429-class)
    #[error("rate limited on '{resource}' ({reason}), retry after {retry_after:?}")]
    RateLimited {
        resource: String,
        reason: RateLimitReason,
        retry_after: Duration,
    },

    /// Fast-failed because the circuit breaker is open
    #[error("circuit open for '{resource}'")]
    CircuitOpen {
        resource: String,
        /// Time remaining until the breaker will probe again, if known
        retry_after: Option<Duration>,
    },

    /// Caller-supplied timeout elapsed before the loader completed
    #[error("operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Connection-class failure (DNS, refused, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Authentication/authorization failure (never retried)
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Remote returned an HTTP-style status. 5xx is retryable, 4xx is not.
    #[error("upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Fallback classification (not retried)
    #[error("unknown error: {0}")]
    Unknown(String),

    /// Retry budget exhausted; wraps the final attempt's error
    #[error("'{label}' failed after {attempts} attempts")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// True for denials produced by this layer without invoking the loader.
    #[must_use]
    pub fn is_local_denial(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::EntryTooLarge { .. } => true,
            Self::RateLimited { reason, .. } => *reason != RateLimitReason::Upstream,
            _ => false,
        }
    }
}
