//! # Trending Ranker
//!
//! Runs refresh cycles: read the recent view window, score it, pick the
//! top-K and persist a complete rank assignment.
//!
//! ## Refresh Cycle
//!
//! ```text
//!     scheduler tick
//!          │
//!          ▼
//!     try_lock ──busy──► Skipped (overlapping trigger dropped)
//!          │
//!          ▼
//!     view_events(window) ──► score ──► top_k
//!          │                              │
//!          │                     empty? ──┴──► lifetime_view_order(k)
//!          ▼
//!     ranked_slugs()  (previous leaders)
//!          │
//!          ▼
//!     assignment = [1..=K ranked] + [stale → None]
//!          │
//!          ▼
//!     apply_rank_assignment()  (one logical update)
//! ```
//!
//! Every read finishes before the single write, and every collaborator call
//! runs under the cycle's deadline. A failed or timed-out cycle therefore
//! writes nothing and the previous ranks stay visible.

use super::model::{TrendingRank, TrendingScore};
use super::scorer::{TrendingScorer, DEFAULT_TOP_K, DEFAULT_WINDOW_HOURS};
use super::source::{RankStore, ViewEventSource};
use crate::clock::{Clock, SystemClock};
use crate::error::{BoxError, ConfigError, RefreshError, RefreshStage};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default budget for the collaborator calls of one refresh cycle.
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 30_000;

/// Settings of a [`TrendingRanker`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Leaderboard size.
    pub k: usize,

    /// Scoring window in hours.
    pub window_hours: u32,

    /// Budget for all collaborator calls of one cycle, in milliseconds.
    pub refresh_timeout_ms: u64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_TOP_K,
            window_hours: DEFAULT_WINDOW_HOURS,
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT_MS,
        }
    }
}

impl RankerConfig {
    /// Sets the leaderboard size.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Sets the scoring window.
    pub fn with_window_hours(mut self, hours: u32) -> Self {
        self.window_hours = hours;
        self
    }

    /// Sets the per-cycle deadline.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_ms = duration_ms(timeout);
        self
    }

    /// Per-cycle deadline as a `Duration`.
    #[inline]
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroTopK`], [`ConfigError::ZeroTrendingWindow`] or
    /// [`ConfigError::ZeroRefreshTimeout`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.window_hours == 0 {
            return Err(ConfigError::ZeroTrendingWindow);
        }
        if self.refresh_timeout_ms == 0 {
            return Err(ConfigError::ZeroRefreshTimeout);
        }
        Ok(())
    }
}

/// What the applied ranking was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBasis {
    /// Decayed view velocity over the scoring window.
    Trending,

    /// All-time view counts, used when the window held no views.
    LifetimeViews,
}

/// Details of an applied refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    /// Full assignment written to the rank store.
    pub assignment: Vec<TrendingRank>,

    /// Source of the ordering.
    pub basis: RankBasis,

    /// View events read from the window.
    pub events_read: usize,

    /// Wall time the cycle took.
    pub duration: Duration,
}

impl RefreshReport {
    /// Ranked slugs in rank order.
    pub fn ranked(&self) -> Vec<&str> {
        self.assignment
            .iter()
            .filter(|entry| entry.is_ranked())
            .map(|entry| entry.slug.as_str())
            .collect()
    }

    /// Slugs whose rank was cleared.
    pub fn cleared(&self) -> Vec<&str> {
        self.assignment
            .iter()
            .filter(|entry| !entry.is_ranked())
            .map(|entry| entry.slug.as_str())
            .collect()
    }
}

/// Result of a refresh trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new assignment was persisted.
    Applied(RefreshReport),

    /// Another refresh was in flight; this trigger was dropped.
    Skipped,
}

impl RefreshOutcome {
    /// The report, when the refresh was applied.
    pub fn report(&self) -> Option<&RefreshReport> {
        match self {
            Self::Applied(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

/// Builds the assignment for a new leaderboard.
///
/// `top` gets dense ranks starting at 1, in order; a repeated slug keeps its
/// first rank. Every slug in `previous` that is not in `top` is cleared.
/// Cleared entries follow the ranked ones, sorted by slug.
pub fn build_assignment(top: &[String], previous: &[String]) -> Vec<TrendingRank> {
    let mut leaders: HashSet<&str> = HashSet::with_capacity(top.len());
    let ranked: Vec<TrendingRank> = top
        .iter()
        .filter(|&slug| leaders.insert(slug.as_str()))
        .enumerate()
        .map(|(i, slug)| {
            let rank = u32::try_from(i).map_or(u32::MAX, |i| i.saturating_add(1));
            TrendingRank::ranked(slug.clone(), rank)
        })
        .collect();

    let mut stale: Vec<&str> = previous
        .iter()
        .map(String::as_str)
        .filter(|slug| !leaders.contains(slug))
        .collect();
    stale.sort_unstable();
    stale.dedup();

    ranked
        .into_iter()
        .chain(stale.into_iter().map(TrendingRank::cleared))
        .collect()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Drops repeated slugs, keeping the first occurrence, then caps at `k`.
fn dedup_capped(mut slugs: Vec<String>, k: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(slugs.len());
    slugs.retain(|slug| seen.insert(slug.clone()));
    slugs.truncate(k);
    slugs
}

#[derive(Debug, Default)]
struct RankerCounters {
    applied: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    fallbacks: AtomicU64,
    last_duration_ms: AtomicU64,
}

/// Counters of a [`TrendingRanker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankerStats {
    /// Refreshes that persisted an assignment.
    pub refreshes_applied: u64,

    /// Refreshes that failed and wrote nothing.
    pub refreshes_failed: u64,

    /// Triggers dropped because a refresh was in flight.
    pub refreshes_skipped: u64,

    /// Applied refreshes that used the lifetime-view fallback.
    pub fallbacks_used: u64,

    /// Duration of the last applied refresh, in milliseconds.
    pub last_duration_ms: u64,
}

/// Orchestrates refresh cycles and serves trending lists.
///
/// Collaborators are injected; the ranker owns no storage of its own besides
/// the last applied leaderboard, kept for serving when the log is
/// unreachable.
pub struct TrendingRanker {
    events: Arc<dyn ViewEventSource>,
    ranks: Arc<dyn RankStore>,
    scorer: TrendingScorer,
    clock: Arc<dyn Clock>,
    config: RankerConfig,

    /// Serializes refresh cycles.
    refresh_lock: Mutex<()>,

    /// Ranked slugs of the last applied assignment.
    last_ranked: RwLock<Vec<String>>,

    counters: RankerCounters,
}

impl TrendingRanker {
    /// Creates a ranker on the system clock.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an invalid `config`.
    pub fn new(
        events: Arc<dyn ViewEventSource>,
        ranks: Arc<dyn RankStore>,
        config: RankerConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(events, ranks, config, Arc::new(SystemClock))
    }

    /// Creates a ranker reading "now" from `clock`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an invalid `config`.
    pub fn with_clock(
        events: Arc<dyn ViewEventSource>,
        ranks: Arc<dyn RankStore>,
        config: RankerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            events,
            ranks,
            scorer: TrendingScorer::new(config.window_hours),
            clock,
            config,
            refresh_lock: Mutex::new(()),
            last_ranked: RwLock::new(Vec::new()),
            counters: RankerCounters::default(),
        })
    }

    /// Ranker settings.
    #[inline]
    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Runs one refresh cycle with the configured `k` and deadline.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshError`] when a collaborator fails or the deadline
    /// passes. Nothing is written in that case.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        self.refresh_with_deadline(self.config.k, self.config.refresh_timeout())
            .await
    }

    /// Runs one refresh cycle for a leaderboard of `k` under `deadline`.
    ///
    /// Returns [`RefreshOutcome::Skipped`] without doing anything when
    /// another cycle is already running.
    ///
    /// # Errors
    ///
    /// Same as [`TrendingRanker::refresh`].
    pub async fn refresh_with_deadline(
        &self,
        k: usize,
        deadline: Duration,
    ) -> Result<RefreshOutcome, RefreshError> {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            warn!("Trending refresh already running, dropping trigger");
            return Ok(RefreshOutcome::Skipped);
        };

        let started = Instant::now();
        match self.run_cycle(k, deadline, started).await {
            Ok(report) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .last_duration_ms
                    .store(duration_ms(report.duration), Ordering::Relaxed);
                if report.basis == RankBasis::LifetimeViews {
                    self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                }
                *self.last_ranked.write() =
                    report.ranked().into_iter().map(str::to_string).collect();

                info!(
                    "Trending refresh applied {} ranks, cleared {} ({:?}, {} events, {:?})",
                    report.ranked().len(),
                    report.cleared().len(),
                    report.basis,
                    report.events_read,
                    report.duration
                );
                Ok(RefreshOutcome::Applied(report))
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Trending refresh failed, previous ranks kept: {}", err);
                Err(err)
            }
        }
    }

    async fn run_cycle(
        &self,
        k: usize,
        deadline: Duration,
        started: Instant,
    ) -> Result<RefreshReport, RefreshError> {
        let until = tokio::time::Instant::now() + deadline;

        let events = within(
            RefreshStage::EventRead,
            until,
            deadline,
            self.events.view_events(self.config.window_hours),
        )
        .await?;

        let scores = self.scorer.score(&events, self.clock.now_ms());
        let (top, basis) = if scores.is_empty() {
            debug!("No views in the trending window, ranking by lifetime views");
            let order = within(
                RefreshStage::FallbackRead,
                until,
                deadline,
                self.events.lifetime_view_order(k),
            )
            .await?;
            (dedup_capped(order, k), RankBasis::LifetimeViews)
        } else {
            (TrendingScorer::top_k(&scores, k), RankBasis::Trending)
        };

        let previous = within(
            RefreshStage::RankRead,
            until,
            deadline,
            self.ranks.ranked_slugs(),
        )
        .await?;
        let assignment = build_assignment(&top, &previous);

        within(
            RefreshStage::RankWrite,
            until,
            deadline,
            self.ranks.apply_rank_assignment(&assignment),
        )
        .await?;

        Ok(RefreshReport {
            assignment,
            basis,
            events_read: events.len(),
            duration: started.elapsed(),
        })
    }

    /// Scores the current window without persisting anything.
    ///
    /// # Errors
    ///
    /// [`RefreshError`] when the event read fails or exceeds the configured
    /// deadline.
    pub async fn current_scores(&self) -> Result<Vec<TrendingScore>, RefreshError> {
        let deadline = self.config.refresh_timeout();
        let events = within(
            RefreshStage::EventRead,
            tokio::time::Instant::now() + deadline,
            deadline,
            self.events.view_events(self.config.window_hours),
        )
        .await?;

        Ok(self.scorer.score(&events, self.clock.now_ms()))
    }

    /// On-demand top-`k` for serving; never fails.
    ///
    /// Order of preference: the live window, the last applied leaderboard
    /// (when the log is unreachable), the lifetime-view ordering, and
    /// finally an empty list.
    pub async fn trending(&self, k: usize) -> Vec<String> {
        match self.current_scores().await {
            Ok(scores) if !scores.is_empty() => return TrendingScorer::top_k(&scores, k),
            Ok(_) => {}
            Err(err) => {
                warn!("Serving cached trending list: {}", err);
                let cached: Vec<String> = self.last_ranked.read().iter().take(k).cloned().collect();
                if !cached.is_empty() {
                    return cached;
                }
            }
        }

        let deadline = self.config.refresh_timeout();
        match within(
            RefreshStage::FallbackRead,
            tokio::time::Instant::now() + deadline,
            deadline,
            self.events.lifetime_view_order(k),
        )
        .await
        {
            Ok(order) => dedup_capped(order, k),
            Err(err) => {
                warn!("No trending list available: {}", err);
                Vec::new()
            }
        }
    }

    /// Ranked slugs of the last applied assignment, in rank order.
    pub fn last_ranks(&self) -> Vec<String> {
        self.last_ranked.read().clone()
    }

    /// Refresh counters.
    pub fn stats(&self) -> RankerStats {
        RankerStats {
            refreshes_applied: self.counters.applied.load(Ordering::Relaxed),
            refreshes_failed: self.counters.failed.load(Ordering::Relaxed),
            refreshes_skipped: self.counters.skipped.load(Ordering::Relaxed),
            fallbacks_used: self.counters.fallbacks.load(Ordering::Relaxed),
            last_duration_ms: self.counters.last_duration_ms.load(Ordering::Relaxed),
        }
    }

    /// Spawns a task refreshing every `interval` on the current tokio runtime.
    ///
    /// The first refresh runs immediately. Ticks missed while a slow refresh
    /// was running are skipped. The task stops when the returned sender
    /// fires or is dropped.
    pub fn start_refresh_task(
        self: Arc<Self>,
        interval: Duration,
    ) -> (JoinHandle<()>, oneshot::Sender<()>) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let ranker = self;

        let handle = tokio::spawn(async move {
            info!("Started trending refresh task (interval: {:?})", interval);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        info!("Trending refresh task stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Failures are logged by refresh_with_deadline and retried next tick
                        let _ = ranker.refresh().await;
                    }
                }
            }
        });

        (handle, stop_tx)
    }
}

impl std::fmt::Debug for TrendingRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendingRanker")
            .field("config", &self.config)
            .field("last_ranked", &self.last_ranked.read().len())
            .field("clock", &self.clock)
            .finish()
    }
}

/// Runs a collaborator call under the cycle deadline.
async fn within<T, F>(
    stage: RefreshStage,
    until: tokio::time::Instant,
    deadline: Duration,
    call: F,
) -> Result<T, RefreshError>
where
    F: Future<Output = Result<T, BoxError>>,
{
    match tokio::time::timeout_at(until, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(stage_error(stage, err)),
        Err(_) => Err(RefreshError::Timeout { stage, deadline }),
    }
}

fn stage_error(stage: RefreshStage, err: BoxError) -> RefreshError {
    match stage {
        RefreshStage::EventRead => RefreshError::EventRead(err),
        RefreshStage::FallbackRead => RefreshError::FallbackRead(err),
        RefreshStage::RankRead => RefreshError::RankRead(err),
        RefreshStage::RankWrite => RefreshError::RankWrite(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::trending::memory::{InMemoryRankStore, InMemoryViewLog};
    use crate::trending::model::ViewEvent;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    const HOUR: u64 = 3_600_000;
    const NOW: u64 = 500 * HOUR;

    fn setup(k: usize) -> (Arc<InMemoryViewLog>, Arc<InMemoryRankStore>, TrendingRanker) {
        let clock = Arc::new(ManualClock::new(NOW));
        let log = Arc::new(InMemoryViewLog::new(clock.clone()));
        let store = Arc::new(InMemoryRankStore::new());
        let ranker = TrendingRanker::with_clock(
            log.clone(),
            store.clone(),
            RankerConfig::default().with_k(k),
            clock,
        )
        .unwrap();
        (log, store, ranker)
    }

    /// Event source that fails or stalls on demand.
    struct FlakySource {
        fail: AtomicBool,
        stall: AtomicBool,
        events: Vec<ViewEvent>,
    }

    #[async_trait]
    impl ViewEventSource for FlakySource {
        async fn view_events(&self, _since: u32) -> Result<Vec<ViewEvent>, BoxError> {
            if self.stall.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err("view log unavailable".into());
            }
            Ok(self.events.clone())
        }

        async fn lifetime_view_order(&self, _limit: usize) -> Result<Vec<String>, BoxError> {
            Err("lifetime order unavailable".into())
        }
    }

    /// Event source whose lifetime ordering repeats slugs.
    struct RepeatingLifetimeOrder(Vec<&'static str>);

    #[async_trait]
    impl ViewEventSource for RepeatingLifetimeOrder {
        async fn view_events(&self, _since: u32) -> Result<Vec<ViewEvent>, BoxError> {
            Ok(Vec::new())
        }

        async fn lifetime_view_order(&self, _limit: usize) -> Result<Vec<String>, BoxError> {
            Ok(self.0.iter().map(|slug| slug.to_string()).collect())
        }
    }

    #[test]
    fn test_build_assignment() {
        let top = vec!["b".to_string(), "a".to_string()];
        let previous = vec!["z".to_string(), "a".to_string(), "c".to_string()];

        assert_eq!(
            build_assignment(&top, &previous),
            vec![
                TrendingRank::ranked("b", 1),
                TrendingRank::ranked("a", 2),
                TrendingRank::cleared("c"),
                TrendingRank::cleared("z"),
            ]
        );
        assert!(build_assignment(&[], &[]).is_empty());
    }

    #[test]
    fn test_build_assignment_ranks_repeated_slug_once() {
        let top: Vec<String> = ["a", "a", "b", "a"].iter().map(|s| s.to_string()).collect();

        assert_eq!(
            build_assignment(&top, &["a".to_string()]),
            vec![TrendingRank::ranked("a", 1), TrendingRank::ranked("b", 2)]
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(RankerConfig::default().validate().is_ok());
        assert_eq!(
            RankerConfig::default().with_window_hours(0).validate(),
            Err(ConfigError::ZeroTrendingWindow)
        );
        assert_eq!(
            RankerConfig::default()
                .with_refresh_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroRefreshTimeout)
        );
        assert_eq!(
            RankerConfig::default().with_k(0).validate(),
            Err(ConfigError::ZeroTopK)
        );
        assert!(TrendingRanker::new(
            Arc::new(RepeatingLifetimeOrder(vec![])),
            Arc::new(InMemoryRankStore::new()),
            RankerConfig::default().with_k(0),
        )
        .is_err());
    }

    #[test]
    fn test_refresh_timeout_saturates() {
        let config = RankerConfig::default().with_refresh_timeout(Duration::MAX);
        assert_eq!(config.refresh_timeout_ms, u64::MAX);
    }

    #[tokio::test]
    async fn test_repeated_lifetime_slugs_keep_ranks_dense() {
        let store = Arc::new(InMemoryRankStore::new());
        let ranker = TrendingRanker::with_clock(
            Arc::new(RepeatingLifetimeOrder(vec!["a", "a", "b", "c"])),
            store.clone(),
            RankerConfig::default().with_k(3),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        let outcome = ranker.refresh().await.unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(report.basis, RankBasis::LifetimeViews);
        assert_eq!(report.ranked(), vec!["a", "b", "c"]);
        assert_eq!(store.rank_of("a"), Some(1));
        assert_eq!(store.rank_of("b"), Some(2));
        assert_eq!(store.rank_of("c"), Some(3));
        assert_eq!(ranker.trending(2).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_zero_k_with_views_is_not_a_fallback() {
        let (log, store, ranker) = setup(5);
        log.record_at("live", NOW);
        log.add_lifetime_views("archive", 100);

        let outcome = ranker
            .refresh_with_deadline(0, Duration::from_secs(5))
            .await
            .unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(report.basis, RankBasis::Trending);
        assert!(report.ranked().is_empty());
        assert!(store.leaderboard().is_empty());
        assert_eq!(ranker.stats().fallbacks_used, 0);
    }

    #[tokio::test]
    async fn test_refresh_ranks_by_recency() {
        let (log, store, ranker) = setup(2);
        log.record_at("old-news", NOW - 48 * HOUR);
        log.record_at("old-news", NOW - 47 * HOUR);
        log.record_at("breaking", NOW);
        log.record_at("steady", NOW - 5 * HOUR);

        let outcome = ranker.refresh().await.unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(report.basis, RankBasis::Trending);
        assert_eq!(report.ranked(), vec!["breaking", "steady"]);
        assert_eq!(report.events_read, 4);
        assert_eq!(store.leaderboard(), vec!["breaking", "steady"]);
        assert_eq!(ranker.last_ranks(), vec!["breaking", "steady"]);
    }

    #[tokio::test]
    async fn test_stale_ranks_are_cleared() {
        let (log, store, ranker) = setup(1);
        store
            .apply_rank_assignment(&[TrendingRank::ranked("yesterday", 1)])
            .await
            .unwrap();
        log.record_at("today", NOW);

        let outcome = ranker.refresh().await.unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(report.cleared(), vec!["yesterday"]);
        assert_eq!(store.leaderboard(), vec!["today"]);
        assert_eq!(store.rank_of("yesterday"), None);
    }

    #[tokio::test]
    async fn test_fallback_to_lifetime_views() {
        let (log, store, ranker) = setup(2);
        log.add_lifetime_views("evergreen", 900);
        log.add_lifetime_views("classic", 500);
        log.add_lifetime_views("niche", 10);

        let outcome = ranker.refresh().await.unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(report.basis, RankBasis::LifetimeViews);
        assert_eq!(store.leaderboard(), vec!["evergreen", "classic"]);
        assert_eq!(ranker.stats().fallbacks_used, 1);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (log, _store, ranker) = setup(3);
        for (slug, age) in [("a", 1), ("b", 2), ("c", 3), ("a", 4)] {
            log.record_at(slug, NOW - age * HOUR);
        }

        let first = ranker.refresh().await.unwrap();
        let second = ranker.refresh().await.unwrap();
        assert_eq!(
            first.report().unwrap().assignment,
            second.report().unwrap().assignment
        );
    }

    #[tokio::test]
    async fn test_failed_read_keeps_previous_ranks() {
        let store = Arc::new(InMemoryRankStore::new());
        store
            .apply_rank_assignment(&[TrendingRank::ranked("kept", 1)])
            .await
            .unwrap();
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(true),
            stall: AtomicBool::new(false),
            events: vec![ViewEvent::new("new", NOW)],
        });
        let ranker = TrendingRanker::with_clock(
            source,
            store.clone(),
            RankerConfig::default(),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        let err = ranker.refresh().await.unwrap_err();
        assert_eq!(err.stage(), RefreshStage::EventRead);
        assert_eq!(store.leaderboard(), vec!["kept"]);
        assert_eq!(ranker.stats().refreshes_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_refresh() {
        let store = Arc::new(InMemoryRankStore::new());
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(false),
            stall: AtomicBool::new(true),
            events: vec![],
        });
        let ranker = TrendingRanker::with_clock(
            source,
            store.clone(),
            RankerConfig::default(),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        let err = ranker
            .refresh_with_deadline(5, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RefreshError::Timeout {
                stage: RefreshStage::EventRead,
                ..
            }
        ));
        assert!(store.leaderboard().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_trigger_is_skipped() {
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(false),
            stall: AtomicBool::new(true),
            events: vec![],
        });
        let ranker = Arc::new(
            TrendingRanker::with_clock(
                source,
                Arc::new(InMemoryRankStore::new()),
                RankerConfig::default(),
                Arc::new(ManualClock::new(NOW)),
            )
            .unwrap(),
        );

        let slow = {
            let ranker = ranker.clone();
            tokio::spawn(async move {
                ranker
                    .refresh_with_deadline(1, Duration::from_secs(10))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(ranker.refresh().await.unwrap(), RefreshOutcome::Skipped);
        assert_eq!(ranker.stats().refreshes_skipped, 1);

        assert!(slow.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_trending_serves_cache_on_failure() {
        let store = Arc::new(InMemoryRankStore::new());
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(false),
            stall: AtomicBool::new(false),
            events: vec![ViewEvent::new("x", NOW), ViewEvent::new("y", NOW - HOUR)],
        });
        let ranker = TrendingRanker::with_clock(
            source.clone(),
            store,
            RankerConfig::default(),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        assert_eq!(ranker.trending(5).await, vec!["x", "y"]);

        // Nothing applied yet and fallback fails too: empty, not an error
        source.fail.store(true, Ordering::SeqCst);
        assert!(ranker.trending(5).await.is_empty());

        source.fail.store(false, Ordering::SeqCst);
        ranker.refresh().await.unwrap();
        source.fail.store(true, Ordering::SeqCst);
        assert_eq!(ranker.trending(1).await, vec!["x"]);
    }

    #[tokio::test]
    async fn test_trending_falls_back_to_lifetime_views() {
        let (log, store, ranker) = setup(3);
        log.add_lifetime_views("archive", 40);

        assert_eq!(ranker.trending(3).await, vec!["archive"]);
        // Read-only: nothing persisted
        assert!(store.leaderboard().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_runs_and_stops() {
        let (log, store, ranker) = setup(1);
        log.record_at("live", NOW);
        let ranker = Arc::new(ranker);

        let (handle, stop_tx) = ranker.clone().start_refresh_task(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(125)).await;

        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(store.leaderboard(), vec!["live"]);
        assert!(ranker.stats().refreshes_applied >= 2);
    }
}
