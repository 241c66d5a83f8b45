//! # Trending Module
//!
//! Popularity ranking of articles from recent view activity.
//!
//! ## Module Structure
//!
//! ```text
//!     trending/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── model.rs        (View events, scores, rank entries)
//!     ├── scorer.rs       (Decay kernel and top-K selection)
//!     ├── source.rs       (Collaborator traits: event log, rank store)
//!     ├── ranker.rs       (Refresh cycles, fallback, scheduling)
//!     └── memory.rs       (In-process collaborators)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     ┌──────────────────┐      ┌─────────┐
//!     │ ViewEventSource  │ ───► │ Scorer  │ ◄── pure, no I/O
//!     └──────────────────┘      └────┬────┘
//!                                    │ top-K
//!                               ┌────▼────┐      ┌───────────┐
//!                               │ Ranker  │ ───► │ RankStore │
//!                               └─────────┘      └───────────┘
//! ```

mod memory;
mod model;
mod ranker;
mod scorer;
mod source;

/// In-process collaborators
pub use memory::{InMemoryRankStore, InMemoryViewLog};

/// Records exchanged with collaborators
pub use model::{TrendingRank, TrendingScore, ViewEvent};

/// Refresh orchestration
pub use ranker::{
    build_assignment, RankBasis, RankerConfig, RankerStats, RefreshOutcome, RefreshReport,
    TrendingRanker, DEFAULT_REFRESH_TIMEOUT_MS,
};

/// Scoring
pub use scorer::{decay_weight, TrendingScorer, DEFAULT_TOP_K, DEFAULT_WINDOW_HOURS};

/// Collaborator contracts
pub use source::{RankStore, ViewEventSource};
