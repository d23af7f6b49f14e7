// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests over the pure parts of the pipeline: cache capacity
//! accounting, backoff bounds, TTL clamping and query normalization.

use proptest::prelude::*;
use resilient_client::ttl::{BaseStrategy, LexicalStrategy, TtlStrategy};
use resilient_client::{CacheStore, RetryConfig, TtlContext, TtlEngine};
use serde_json::json;
use std::time::Duration;

proptest! {
    #[test]
    fn cache_never_exceeds_capacity(
        capacity in 64usize..4096,
        entries in prop::collection::vec((".{0,64}", 1usize..200), 1..100),
    ) {
        let store = CacheStore::new(capacity);
        for (key, len) in entries {
            let value = json!("v".repeat(len));
            let _ = store.set(&key, value, Duration::from_secs(60));
            prop_assert!(store.stats().total_bytes <= capacity);
        }
    }

    #[test]
    fn delete_returns_accounting_to_zero(
        keys in prop::collection::vec("[a-z]{1,8}", 1..50),
    ) {
        let store = CacheStore::new(1024 * 1024);
        for key in &keys {
            store.set(key, json!({"k": key}), Duration::from_secs(60)).unwrap();
        }
        for key in &keys {
            store.delete(key);
        }
        prop_assert_eq!(store.len(), 0);
        prop_assert_eq!(store.stats().total_bytes, 0);
    }

    #[test]
    fn backoff_stays_within_jitter_bounds(
        initial_ms in 1u64..1000,
        max_ms in 1000u64..60_000,
        multiplier in 1.0f64..4.0,
        attempt in 0u32..10,
    ) {
        let config = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
        };
        let delay = config.backoff_delay(attempt);

        // Pre-jitter delay is initial * multiplier^attempt capped at max;
        // jitter multiplies by [0.5, 1.5)
        let exp = Duration::from_millis(initial_ms)
            .mul_f64(multiplier.powi(attempt as i32))
            .min(Duration::from_millis(max_ms));
        prop_assert!(delay >= exp.mul_f64(0.5));
        prop_assert!(delay <= exp.mul_f64(1.5));
    }

    #[test]
    fn computed_ttl_is_always_clamped(
        min_secs in 1u64..600,
        span_secs in 1u64..86_400,
        query in ".{0,40}",
        result_count in prop::option::of(0usize..50),
        is_popular in any::<bool>(),
    ) {
        let min = Duration::from_secs(min_secs);
        let max = Duration::from_secs(min_secs + span_secs);
        let engine = TtlEngine::with_defaults(min, max, min);

        let mut ctx = TtlContext::new("search").with_query(&query).popular(is_popular);
        if let Some(count) = result_count {
            ctx = ctx.with_result_count(count);
        }

        let ttl = engine.compute(&ctx);
        prop_assert!(ttl >= min);
        prop_assert!(ttl <= max);
    }

    #[test]
    fn lexical_vote_never_exceeds_base_for_time_sensitive(
        rest in "[a-z ]{0,30}",
    ) {
        // Any query containing a time-sensitive cue votes at most 5 minutes
        let query = format!("latest {rest}");
        let vote = LexicalStrategy::default()
            .calculate(&TtlContext::new("search").with_query(&query));
        prop_assert_eq!(vote, Some(Duration::from_secs(300)));
    }

    #[test]
    fn base_strategy_always_votes(
        resource in "[a-z]{1,10}",
        result_count in prop::option::of(0usize..100),
        is_popular in any::<bool>(),
    ) {
        let mut ctx = TtlContext::new(&resource).popular(is_popular);
        if let Some(count) = result_count {
            ctx = ctx.with_result_count(count);
        }
        // The base strategy is the floor of the engine: it never abstains
        prop_assert!(BaseStrategy::with_defaults().calculate(&ctx).is_some());
    }

    #[test]
    fn normalization_is_idempotent(query in ".{0,60}") {
        let once = resilient_client::popularity::normalize(&query);
        let twice = resilient_client::popularity::normalize(&once);
        prop_assert_eq!(once, twice);
    }
}
