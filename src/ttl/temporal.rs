//! Time-of-day and day-of-week scaling.
//!
//! Traffic (and content churn) peaks on weekday daytimes, so TTLs shrink
//! there. Two resource classes get extra adjustments: social feeds churn
//! hardest in the evening, forums during work hours.
//!
//! Votes scale the resource's own base duration and are shortening-only:
//! under a min-combinator a lengthening vote can never win, it can only
//! clip another strategy's extension, so quiet-hour factors abstain.

use chrono::{Datelike, Timelike, Weekday};
use std::collections::HashMap;
use std::time::Duration;

use super::{TtlContext, TtlStrategy};

pub struct TemporalStrategy {
    base_by_resource: HashMap<String, Duration>,
    fallback: Duration,
}

impl Default for TemporalStrategy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TemporalStrategy {
    #[must_use]
    pub fn new(fallback: Duration) -> Self {
        Self {
            base_by_resource: HashMap::new(),
            fallback,
        }
    }

    /// Same resource table as the base strategy, so peak-hour scaling
    /// starts from each resource's own duration.
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

    fn multiplier(ctx: &TtlContext) -> f64 {
        let weekday = ctx.now.weekday();
        let hour = ctx.now.hour();
        let is_weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);

        let mut factor = if is_weekend {
            1.3
        } else if (9..18).contains(&hour) {
            0.7
        } else if (18..23).contains(&hour) {
            0.9
        } else {
            1.4
        };

        if ctx.resource == "social" && (18..23).contains(&hour) {
            factor *= 0.5;
        }
        if ctx.resource == "forum" && !is_weekend && (9..18).contains(&hour) {
            factor *= 0.6;
        }

        factor
    }
}

impl TtlStrategy for TemporalStrategy {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn calculate(&self, ctx: &TtlContext) -> Option<Duration> {
        let factor = Self::multiplier(ctx);
        if factor >= 1.0 {
            return None;
        }
        let base = *self
            .base_by_resource
            .get(&ctx.resource)
            .unwrap_or(&self.fallback);
        Some(base.mul_f64(factor))
    }
}
