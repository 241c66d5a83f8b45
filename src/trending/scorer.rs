//! # Trending Scorer
//!
//! Turns a window of view events into per-article popularity scores that
//! favor recent activity.
//!
//! ## Decay Kernel
//!
//! ```text
//!     weight(h) = 1 / (h + 2)^1.5        h = hours since the view
//!
//!     weight
//!     0.354 ┤█
//!           │█▆
//!           │██▄▂
//!           │████▇▅▄▃▂▂▁▁▁▁ . . . . . .
//!         0 └──────────────────────────── hours ago
//!           0     12     24     48     72
//! ```
//!
//! The kernel is maximal for a view that just happened, strictly decreasing
//! with age and never reaches zero, so fresh views dominate without a hard
//! cutoff inside the window.

use super::model::{TrendingScore, ViewEvent};
use std::collections::HashMap;

/// Default scoring window (three days).
pub const DEFAULT_WINDOW_HOURS: u32 = 72;

/// Default leaderboard size.
pub const DEFAULT_TOP_K: usize = 10;

const HOUR_MS: f64 = 3_600_000.0;

/// Weight of one view that happened `hours_ago` hours before now.
///
/// Negative ages (clock skew) count as zero.
///
/// # Example
///
/// ```rust
/// use newsdesk::decay_weight;
///
/// assert!((decay_weight(0.0) - 0.3536).abs() < 1e-4);
/// assert!(decay_weight(1.0) > decay_weight(10.0));
/// assert_eq!(decay_weight(-3.0), decay_weight(0.0));
/// ```
#[inline]
pub fn decay_weight(hours_ago: f64) -> f64 {
    1.0 / (hours_ago.max(0.0) + 2.0).powf(1.5)
}

/// Scores view events and picks the leaders.
///
/// Scoring is a pure computation: no I/O, no shared state.
///
/// # Example
///
/// ```rust
/// use newsdesk::{TrendingScorer, ViewEvent};
///
/// const HOUR: u64 = 3_600_000;
/// let now = 100 * HOUR;
/// let events = vec![
///     ViewEvent::new("a", now),
///     ViewEvent::new("a", now - 10 * HOUR),
///     ViewEvent::new("b", now),
/// ];
///
/// let scores = TrendingScorer::default().score(&events, now);
/// assert_eq!(TrendingScorer::top_k(&scores, 2), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendingScorer {
    window_hours: u32,
}

impl Default for TrendingScorer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_HOURS)
    }
}

impl TrendingScorer {
    /// Creates a scorer that ignores views older than `window_hours`.
    pub fn new(window_hours: u32) -> Self {
        Self { window_hours }
    }

    /// Length of the scoring window in hours.
    #[inline]
    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    /// Oldest instant still inside the window.
    #[inline]
    fn cutoff_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(u64::from(self.window_hours) * 3_600_000)
    }

    /// Sums decay weights per slug over the events inside the window.
    ///
    /// Events older than the window are skipped, so callers may pass an
    /// already-bounded slice or the raw log alike. Slugs without qualifying
    /// events are absent from the output. Output order follows the first
    /// qualifying event of each slug.
    pub fn score(&self, events: &[ViewEvent], now_ms: u64) -> Vec<TrendingScore> {
        let cutoff = self.cutoff_ms(now_ms);
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut scores: Vec<TrendingScore> = Vec::new();

        for event in events.iter().filter(|e| e.viewed_at_ms >= cutoff) {
            let hours_ago = now_ms.saturating_sub(event.viewed_at_ms) as f64 / HOUR_MS;
            let weight = decay_weight(hours_ago);

            match index.get(event.slug.as_str()) {
                Some(&i) => scores[i].score += weight,
                None => {
                    index.insert(event.slug.as_str(), scores.len());
                    scores.push(TrendingScore {
                        slug: event.slug.clone(),
                        score: weight,
                    });
                }
            }
        }

        scores
    }

    /// Returns up to `k` slugs by descending score.
    ///
    /// Equal scores are ordered by slug, lexicographically, so the result
    /// does not depend on input order.
    pub fn top_k(scores: &[TrendingScore], k: usize) -> Vec<String> {
        let mut ranked: Vec<&TrendingScore> = scores.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.slug.cmp(&b.slug))
        });

        ranked
            .into_iter()
            .take(k)
            .map(|s| s.slug.clone())
            .collect()
    }

    /// Scores `events` and returns the top `k` slugs in one step.
    pub fn rank(&self, events: &[ViewEvent], now_ms: u64, k: usize) -> Vec<String> {
        Self::top_k(&self.score(events, now_ms), k)
    }
}
