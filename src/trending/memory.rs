//! In-process collaborators for tests, demos and single-node deployments.
//!
//! Both types keep their state behind a `parking_lot` lock and implement the
//! collaborator traits, so they can be swapped for database-backed versions
//! without touching the ranker.

use super::model::{TrendingRank, ViewEvent};
use super::source::{RankStore, ViewEventSource};
use crate::clock::Clock;
use crate::error::BoxError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// View-event log held in memory.
///
/// Every recorded slug counts as published until [`InMemoryViewLog::unpublish`]
/// is called for it. Recent events are kept until
/// [`InMemoryViewLog::prune_before`] drops them; lifetime counts survive
/// pruning.
#[derive(Debug)]
pub struct InMemoryViewLog {
    clock: Arc<dyn Clock>,
    inner: RwLock<ViewLogState>,
}

#[derive(Debug, Default)]
struct ViewLogState {
    events: Vec<ViewEvent>,
    lifetime: HashMap<String, u64>,
    unpublished: HashSet<String>,
}

impl InMemoryViewLog {
    /// Creates an empty log; `view_events` windows are measured on `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(ViewLogState::default()),
        }
    }

    /// Records a view of `slug` at the clock's current time.
    pub fn record(&self, slug: &str) {
        let now_ms = self.clock.now_ms();
        self.record_at(slug, now_ms);
    }

    /// Records a view of `slug` at an explicit instant.
    pub fn record_at(&self, slug: &str, viewed_at_ms: u64) {
        let mut state = self.inner.write();
        state.events.push(ViewEvent::new(slug, viewed_at_ms));
        *state.lifetime.entry(slug.to_string()).or_insert(0) += 1;
    }

    /// Adds lifetime views without recording recent events, as a log that
    /// was compacted long ago would report them.
    pub fn add_lifetime_views(&self, slug: &str, views: u64) {
        *self
            .inner
            .write()
            .lifetime
            .entry(slug.to_string())
            .or_insert(0) += views;
    }

    /// Excludes `slug` from the lifetime ordering.
    pub fn unpublish(&self, slug: &str) {
        self.inner.write().unpublished.insert(slug.to_string());
    }

    /// Drops events recorded before `cutoff_ms`. Returns how many were dropped.
    ///
    /// Long-running hosts call this with the start of the scoring window so
    /// the log stays bounded.
    pub fn prune_before(&self, cutoff_ms: u64) -> usize {
        let mut state = self.inner.write();
        let before = state.events.len();
        state.events.retain(|event| event.viewed_at_ms >= cutoff_ms);
        before - state.events.len()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    /// Whether no event has been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }
}

#[async_trait]
impl ViewEventSource for InMemoryViewLog {
    async fn view_events(&self, since_hours_ago: u32) -> Result<Vec<ViewEvent>, BoxError> {
        let cutoff = self
            .clock
            .now_ms()
            .saturating_sub(u64::from(since_hours_ago) * 3_600_000);

        Ok(self
            .inner
            .read()
            .events
            .iter()
            .filter(|event| event.viewed_at_ms >= cutoff)
            .cloned()
            .collect())
    }

    async fn lifetime_view_order(&self, limit: usize) -> Result<Vec<String>, BoxError> {
        let state = self.inner.read();
        let mut counts: Vec<(&String, u64)> = state
            .lifetime
            .iter()
            .filter(|(slug, _)| !state.unpublished.contains(*slug))
            .map(|(slug, views)| (slug, *views))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Ok(counts
            .into_iter()
            .take(limit)
            .map(|(slug, _)| slug.clone())
            .collect())
    }
}

/// Rank table held in memory; assignments are applied under one lock.
#[derive(Debug, Default)]
pub struct InMemoryRankStore {
    ranks: Mutex<BTreeMap<String, u32>>,
}

impl InMemoryRankStore {
    /// Creates an empty rank table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current ranked slugs ordered by rank.
    pub fn leaderboard(&self) -> Vec<String> {
        let ranks = self.ranks.lock();
        let mut entries: Vec<(&String, &u32)> = ranks.iter().collect();
        entries.sort_by_key(|(_, rank)| **rank);
        entries.into_iter().map(|(slug, _)| slug.clone()).collect()
    }

    /// Rank currently held by `slug`.
    pub fn rank_of(&self, slug: &str) -> Option<u32> {
        self.ranks.lock().get(slug).copied()
    }
}

#[async_trait]
impl RankStore for InMemoryRankStore {
    async fn ranked_slugs(&self) -> Result<Vec<String>, BoxError> {
        Ok(self.ranks.lock().keys().cloned().collect())
    }

    async fn apply_rank_assignment(&self, ranks: &[TrendingRank]) -> Result<(), BoxError> {
        let next: BTreeMap<String, u32> = ranks
            .iter()
            .filter_map(|entry| entry.rank.map(|rank| (entry.slug.clone(), rank)))
            .collect();

        // Swap the whole table so readers never see a partial assignment
        *self.ranks.lock() = next;
        Ok(())
    }
}
