//! Records exchanged between the trending engine and its collaborators.

/// One recorded article view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewEvent {
    /// Article identifier.
    pub slug: String,

    /// Instant (ms since epoch) the view was recorded.
    pub viewed_at_ms: u64,
}

impl ViewEvent {
    /// Creates a view event.
    pub fn new(slug: impl Into<String>, viewed_at_ms: u64) -> Self {
        Self {
            slug: slug.into(),
            viewed_at_ms,
        }
    }
}

/// Decayed popularity of one article over the scoring window.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingScore {
    /// Article identifier.
    pub slug: String,

    /// Sum of the decay weights of the article's views. Always positive.
    pub score: f64,
}

/// Rank to persist for one article.
///
/// `rank == None` clears a previous rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrendingRank {
    /// Article identifier.
    pub slug: String,

    /// 1-based leaderboard position, or `None` when not in the top-K.
    pub rank: Option<u32>,
}

impl TrendingRank {
    /// A ranked entry.
    pub fn ranked(slug: impl Into<String>, rank: u32) -> Self {
        Self {
            slug: slug.into(),
            rank: Some(rank),
        }
    }

    /// An entry clearing a stale rank.
    pub fn cleared(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            rank: None,
        }
    }

    /// Whether this entry assigns a rank.
    #[inline]
    pub fn is_ranked(&self) -> bool {
        self.rank.is_some()
    }
}
