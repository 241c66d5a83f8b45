//! Contracts of the storage collaborators behind the trending engine.
//!
//! The engine never talks to a database directly. Hosts implement these
//! traits over their ORM and inject them into
//! [`TrendingRanker`](crate::TrendingRanker).

use super::model::{TrendingRank, ViewEvent};
use crate::error::BoxError;
use async_trait::async_trait;

/// Read access to the append-only view-event log.
#[async_trait]
pub trait ViewEventSource: Send + Sync {
    /// Returns every view event newer than `since_hours_ago` hours.
    async fn view_events(&self, since_hours_ago: u32) -> Result<Vec<ViewEvent>, BoxError>;

    /// Returns up to `limit` published article slugs ordered by all-time
    /// view count, most viewed first.
    async fn lifetime_view_order(&self, limit: usize) -> Result<Vec<String>, BoxError>;
}

/// Persistence of the materialized trending rank.
#[async_trait]
pub trait RankStore: Send + Sync {
    /// Returns the slugs that currently hold a rank.
    async fn ranked_slugs(&self) -> Result<Vec<String>, BoxError>;

    /// Applies a full assignment as one logical update.
    ///
    /// Readers must observe either the previous rank set or the new one,
    /// never a mix. Implementations also clear any rank not named in
    /// `ranks`, so no stale rank survives.
    async fn apply_rank_assignment(&self, ranks: &[TrendingRank]) -> Result<(), BoxError>;
}
