//! Query-text categorization.
//!
//! Time-sensitive queries go stale fast; tutorials barely change. The
//! categories and their durations:
//!
//! | category | cue words | TTL |
//! |---|---|---|
//! | time-sensitive | latest, now, today, current, breaking, trending | 5 min |
//! | troubleshooting | bug, error, issue, broken, crash, fix | 30 min |
//! | comparison | vs, versus, compare, comparison | 12 h |
//! | how-to | how to, tutorial, guide, walkthrough | 24 h |
//!
//! Matching is ordered most-conservative first. A query matching no category
//! (or a context with no query at all) abstains so the other strategies
//! decide.

use std::time::Duration;

use super::{TtlContext, TtlStrategy};

const TIME_SENSITIVE: &[&str] = &["latest", "now", "today", "current", "breaking", "trending"];
const TROUBLESHOOTING: &[&str] = &["bug", "error", "issue", "broken", "crash", "fix"];
const COMPARISON: &[&str] = &["vs", "versus", "compare", "comparison"];
const HOW_TO: &[&str] = &["tutorial", "guide", "walkthrough"];

#[derive(Default)]
pub struct LexicalStrategy;

impl LexicalStrategy {
    fn categorize(query: &str) -> Option<Duration> {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let has_any = |cues: &[&str]| words.iter().any(|w| cues.contains(w));

        if has_any(TIME_SENSITIVE) {
            return Some(Duration::from_secs(5 * 60));
        }
        if has_any(TROUBLESHOOTING) {
            return Some(Duration::from_secs(30 * 60));
        }
        if has_any(COMPARISON) {
            return Some(Duration::from_secs(12 * 3600));
        }
        if has_any(HOW_TO) || lowered.contains("how to") {
            return Some(Duration::from_secs(24 * 3600));
        }
        None
    }
}

impl TtlStrategy for LexicalStrategy {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn calculate(&self, ctx: &TtlContext) -> Option<Duration> {
        ctx.query.as_deref().and_then(Self::categorize)
    }
}
