//! Per-resource base durations scaled by result shape and popularity.

use std::collections::HashMap;
use std::time::Duration;

use super::{TtlContext, TtlStrategy};

/// Fixed base TTL per resource class, adjusted by result count and popularity:
/// empty results are halved, large results get 1.5x, popular queries 2x.
pub struct BaseStrategy {
    base_by_resource: HashMap<String, Duration>,
    fallback: Duration,
    /// Result counts at or above this get the long-lived multiplier
    pub large_result_threshold: usize,
}

impl BaseStrategy {
    #[must_use]
    pub fn new(fallback: Duration) -> Self {
        Self {
            base_by_resource: HashMap::new(),
            fallback,
            large_result_threshold: 5,
        }
    }

    /// Standard resource table: searches 1h, docs 2h, social 30m, forums 45m.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut strategy = Self::new(Duration::from_secs(3600));
        strategy.set_base("search", Duration::from_secs(3600));
        strategy.set_base("docs", Duration::from_secs(7200));
        strategy.set_base("social", Duration::from_secs(1800));
        strategy.set_base("forum", Duration::from_secs(2700));
        strategy
    }

    pub fn set_base(&mut self, resource: &str, ttl: Duration) {
        self.base_by_resource.insert(resource.to_string(), ttl);
    }
}

impl TtlStrategy for BaseStrategy {
    fn name(&self) -> &'static str {
        "base"
    }

    fn calculate(&self, ctx: &TtlContext) -> Option<Duration> {
        let mut ttl = *self
            .base_by_resource
            .get(&ctx.resource)
            .unwrap_or(&self.fallback);

        match ctx.result_count {
            Some(0) => ttl = ttl.mul_f64(0.5),
            Some(n) if n >= self.large_result_threshold => ttl = ttl.mul_f64(1.5),
            _ => {}
        }

        if ctx.is_popular {
            ttl = ttl.mul_f64(2.0);
        }

        Some(ttl)
    }
}
