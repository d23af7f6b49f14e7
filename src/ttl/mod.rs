// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Adaptive TTL computation.
//!
//! Each [`TtlStrategy`] inspects the call context and either votes a duration
//! or abstains. The [`TtlEngine`] combines votes by taking the minimum (the
//! most conservative strategy wins) and clamps the result to its configured
//! bounds. Strategies are plain trait objects so operators can swap them at
//! runtime without touching call sites.
//!
//! ```text
//! TtlContext ──▶ BaseStrategy ─────┐
//!            ──▶ LexicalStrategy ──┼──▶ min() ──▶ clamp(min_ttl, max_ttl)
//!            ──▶ TemporalStrategy ─┘
//! ```

pub mod base;
pub mod lexical;
pub mod temporal;

pub use base::BaseStrategy;
pub use lexical::LexicalStrategy;
pub use temporal::TemporalStrategy;

use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::debug;

/// Everything a strategy may inspect when voting a TTL.
#[derive(Debug, Clone)]
pub struct TtlContext {
    pub resource: String,
    pub query: Option<String>,
    pub result_count: Option<usize>,
    pub is_popular: bool,
    /// Wall-clock instant for time-of-day scaling; injectable for tests.
    pub now: DateTime<Local>,
}

impl TtlContext {
    #[must_use]
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            query: None,
            result_count: None,
            is_popular: false,
            now: Local::now(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    #[must_use]
    pub fn with_result_count(mut self, count: usize) -> Self {
        self.result_count = Some(count);
        self
    }

    #[must_use]
    pub fn popular(mut self, is_popular: bool) -> Self {
        self.is_popular = is_popular;
        self
    }
}

/// A pluggable TTL voter.
///
/// Returning `None` abstains from this decision; a strategy with no opinion
/// must not pull the combined TTL down with a default vote.
pub trait TtlStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn calculate(&self, ctx: &TtlContext) -> Option<Duration>;
}

/// Combines strategies by minimum and clamps into `[min_ttl, max_ttl]`.
pub struct TtlEngine {
    strategies: Vec<Box<dyn TtlStrategy>>,
    min_ttl: Duration,
    max_ttl: Duration,
    default_ttl: Duration,
}

impl TtlEngine {
    #[must_use]
    pub fn new(min_ttl: Duration, max_ttl: Duration, default_ttl: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            min_ttl,
            max_ttl,
            default_ttl,
        }
    }

    /// Engine with the standard strategy set: base, lexical, temporal.
    #[must_use]
    pub fn with_defaults(min_ttl: Duration, max_ttl: Duration, default_ttl: Duration) -> Self {
        let mut engine = Self::new(min_ttl, max_ttl, default_ttl);
        engine.push_strategy(Box::new(BaseStrategy::with_defaults()));
        engine.push_strategy(Box::new(LexicalStrategy::default()));
        engine.push_strategy(Box::new(TemporalStrategy::default()));
        engine
    }

    pub fn push_strategy(&mut self, strategy: Box<dyn TtlStrategy>) {
        self.strategies.push(strategy);
    }

    /// Replace the whole strategy set (operator tuning hook).
    pub fn set_strategies(&mut self, strategies: Vec<Box<dyn TtlStrategy>>) {
        self.strategies = strategies;
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Minimum of all strategy votes, clamped; the default when all abstain.
    #[must_use]
    pub fn compute(&self, ctx: &TtlContext) -> Duration {
        let mut chosen: Option<(&'static str, Duration)> = None;

        for strategy in &self.strategies {
            if let Some(ttl) = strategy.calculate(ctx) {
                match chosen {
                    Some((_, current)) if ttl >= current => {}
                    _ => chosen = Some((strategy.name(), ttl)),
                }
            }
        }

        let (winner, ttl) = chosen.unwrap_or(("default", self.default_ttl));
        let clamped = ttl.clamp(self.min_ttl, self.max_ttl);
        debug!(
            resource = %ctx.resource,
            strategy = winner,
            ttl_secs = clamped.as_secs(),
            "Computed adaptive TTL"
        );
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy(&'static str, Option<Duration>);

    impl TtlStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.0
        }
        fn calculate(&self, _ctx: &TtlContext) -> Option<Duration> {
            self.1
        }
    }

    fn engine() -> TtlEngine {
        TtlEngine::new(
            Duration::from_secs(300),
            Duration::from_secs(86_400),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_minimum_wins() {
        let mut e = engine();
        e.push_strategy(Box::new(FixedStrategy("a", Some(Duration::from_secs(7200)))));
        e.push_strategy(Box::new(FixedStrategy("b", Some(Duration::from_secs(1800)))));

        let ttl = e.compute(&TtlContext::new("search"));
        assert_eq!(ttl, Duration::from_secs(1800));
    }

    #[test]
    fn test_abstaining_strategy_does_not_vote() {
        let mut e = engine();
        e.push_strategy(Box::new(FixedStrategy("silent", None)));
        e.push_strategy(Box::new(FixedStrategy("a", Some(Duration::from_secs(7200)))));

        let ttl = e.compute(&TtlContext::new("search"));
        assert_eq!(ttl, Duration::from_secs(7200));
    }

    #[test]
    fn test_all_abstain_uses_default() {
        let mut e = engine();
        e.push_strategy(Box::new(FixedStrategy("silent", None)));

        let ttl = e.compute(&TtlContext::new("search"));
        assert_eq!(ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_clamped_to_bounds() {
        let mut e = engine();
        e.push_strategy(Box::new(FixedStrategy("tiny", Some(Duration::from_secs(1)))));
        assert_eq!(e.compute(&TtlContext::new("x")), Duration::from_secs(300));

        let mut e = engine();
        e.push_strategy(Box::new(FixedStrategy(
            "huge",
            Some(Duration::from_secs(1_000_000)),
        )));
        assert_eq!(e.compute(&TtlContext::new("x")), Duration::from_secs(86_400));
    }

    #[test]
    fn test_runtime_replacement() {
        let mut e = engine();
        e.push_strategy(Box::new(FixedStrategy("a", Some(Duration::from_secs(600)))));
        assert_eq!(e.compute(&TtlContext::new("x")), Duration::from_secs(600));

        e.set_strategies(vec![Box::new(FixedStrategy("b", Some(Duration::from_secs(900))))]);
        assert_eq!(e.strategy_names(), vec!["b"]);
        assert_eq!(e.compute(&TtlContext::new("x")), Duration::from_secs(900));
    }

    #[test]
    fn test_default_engine_extends_large_results() {
        use chrono::TimeZone;

        let e = TtlEngine::with_defaults(
            Duration::from_secs(300),
            Duration::from_secs(86_400),
            Duration::from_secs(3600),
        );
        // Saturday afternoon: temporal abstains, "typescript" matches no
        // lexical category, so the base vote (1h x 1.5) stands
        let mut ctx = TtlContext::new("search")
            .with_query("typescript")
            .with_result_count(5);
        ctx.now = Local
            .with_ymd_and_hms(2025, 6, 14, 14, 0, 0)
            .single()
            .unwrap();
        assert_eq!(e.compute(&ctx).as_millis(), 5_400_000);
    }

    #[test]
    fn test_default_engine_has_standard_strategies() {
        let e = TtlEngine::with_defaults(
            Duration::from_secs(300),
            Duration::from_secs(86_400),
            Duration::from_secs(3600),
        );
        assert_eq!(e.strategy_names(), vec!["base", "lexical", "temporal"]);
    }
}
