//! # Newsdesk - Traffic Shaping and Trending Ranks for a News Portal
//!
//! The two request-path services every news portal ends up needing: a
//! throttle in front of the abuse-prone endpoints, and a popularity ranking
//! that keeps the "trending" box fresh without hitting the view log on
//! every page render.
//!
//! ## Fixed-Window Rate Limiting
//!
//! Each `(policy, identity)` pair owns a counter that lives for one window:
//!
//! ```text
//!     Policy "login": 5 requests / 15 minutes
//!
//!     t=0      [1/5] ✅  window opens, resets at t=15m
//!     t=2m     [2/5] ✅
//!     ...
//!     t=9m     [5/5] ✅  remaining = 0
//!     t=10m    [5/5] ⛔  retry after 300s, counter untouched
//!     t=15m+1  [1/5] ✅  expired window replaced by a fresh one
//! ```
//!
//! Ceilings are never exceeded within a window, even when many threads hit
//! the same key at once.
//!
//! ## Trending Ranking
//!
//! Recent views weigh more than old ones:
//!
//! ```text
//!     score(article) = Σ 1 / (hours_ago + 2)^1.5     over views in the last 72h
//! ```
//!
//! A refresh cycle scores the window, keeps the top 10 and writes ranks
//! `1..=10` plus a clear for every article that dropped out, all as one
//! update. When nobody read anything for three days, lifetime view counts
//! stand in.
//!
//! ## Quick Start
//!
//! ### Throttling a Handler
//!
//! ```rust
//! use newsdesk::{derive_client_identity, RateLimiter, RateLimitConfig, LOGIN};
//!
//! // Stock policies: login, register, forgot_password, newsletter, comments
//! let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
//!
//! // In your request handler:
//! let headers = [("X-Forwarded-For", "203.0.113.9, 10.0.0.1")];
//! let identity = derive_client_identity(&headers);
//! assert_eq!(identity, "203.0.113.9");
//!
//! let result = limiter.check_named(&identity, LOGIN).unwrap();
//! if result.allowed {
//!     // Process the login attempt
//! } else {
//!     // 429 Too Many Requests, Retry-After: result.retry_after_secs
//! }
//! ```
//!
//! ### Custom Policies with the Builder
//!
//! ```rust
//! use newsdesk::{RateLimiterBuilder, RateLimitPolicy};
//!
//! let limiter = RateLimiterBuilder::new()
//!     .policy(RateLimitPolicy::per_minutes("search", 30, 1))
//!     .cleanup_interval_ms(30_000)
//!     .build()
//!     .unwrap();
//!
//! assert!(limiter.check_named("10.1.1.1", "search").unwrap().allowed);
//! assert!(limiter.check_named("10.1.1.1", "login").is_err());
//! ```
//!
//! ### Refreshing the Trending Box
//!
//! ```rust
//! use newsdesk::{InMemoryRankStore, InMemoryViewLog, RankerConfig, SystemClock, TrendingRanker};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let log = Arc::new(InMemoryViewLog::new(Arc::new(SystemClock)));
//! let store = Arc::new(InMemoryRankStore::new());
//! log.record("election-results");
//! log.record("election-results");
//! log.record("weather-warning");
//!
//! let ranker = TrendingRanker::new(log, store.clone(), RankerConfig::default()).unwrap();
//! ranker.refresh().await.unwrap();
//!
//! assert_eq!(store.leaderboard(), vec!["election-results", "weather-warning"]);
//! # });
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Portal Handlers       │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │   RateLimiter       │       │   TrendingRanker     │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • Named policies    │       │ • Decay scoring      │
//!     │ • Atomic windows    │       │ • Top-K + fallback   │
//!     │ • Periodic sweep    │       │ • Atomic rank writes │
//!     └──────────┬──────────┘       └───────────┬──────────┘
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │ DashMap counters    │       │ ViewEventSource /    │
//!     │ (in process)        │       │ RankStore (injected) │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity | Space Complexity |
//! |-----------|----------------|------------------|
//! | check() | O(1) | O(1) per active key |
//! | sweep() | O(n) keys | O(1) |
//! | score() | O(events) | O(articles) |
//! | top_k() | O(articles log articles) | O(articles) |
//!
//! ## Thread Safety
//!
//! All types are thread-safe and can be shared across threads:
//! - `RateLimiter` - Safe to share via `Arc<RateLimiter>`
//! - `TrendingRanker` - Safe to share via `Arc<TrendingRanker>`; refresh
//!   cycles are serialized internally
//!
//! ## Logging
//!
//! Events are emitted through `tracing`: configuration, sweeps, applied
//! refreshes and background task lifecycle at `info`, denials at `debug`,
//! failed or skipped refreshes at `warn`. Install any subscriber to see them.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal modules
mod clock;
mod error;
mod rate_limiter;
mod trending;

// Public re-exports
pub use clock::{current_time_ms, Clock, ManualClock, SystemClock};
pub use error::{BoxError, ConfigError, RateLimitError, RefreshError, RefreshStage};
pub use rate_limiter::{
    derive_client_identity, HeaderSource, HealthStatus, LimiterStats, PolicyMetrics,
    RateLimitConfig, RateLimitEntry, RateLimitPolicy, RateLimitResult, RateLimitStore,
    RateLimiter, COMMENTS, DEFAULT_CLEANUP_INTERVAL_MS, FORGOT_PASSWORD, FORWARDED_FOR_HEADER,
    LOGIN, NEWSLETTER, REAL_IP_HEADER, REGISTER, UNKNOWN_IDENTITY,
};
pub use trending::{
    build_assignment, decay_weight, InMemoryRankStore, InMemoryViewLog, RankBasis, RankStore,
    RankerConfig, RankerStats, RefreshOutcome, RefreshReport, TrendingRank, TrendingRanker,
    TrendingScore, TrendingScorer, ViewEvent, ViewEventSource, DEFAULT_REFRESH_TIMEOUT_MS,
    DEFAULT_TOP_K, DEFAULT_WINDOW_HOURS,
};

use std::sync::Arc;

/// A rate limiter wrapped in `Arc` for convenient thread-safe sharing.
///
/// # Example
/// ```rust
/// use newsdesk::{RateLimiter, RateLimitConfig, SharedRateLimiter, COMMENTS};
/// use std::sync::Arc;
///
/// let shared: SharedRateLimiter = Arc::new(RateLimiter::new(RateLimitConfig::default()).unwrap());
///
/// // Now you can clone and share across threads
/// let limiter = shared.clone();
/// std::thread::spawn(move || {
///     limiter.check_named("192.0.2.1", COMMENTS).unwrap();
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedRateLimiter = Arc<RateLimiter>;

/// A trending ranker wrapped in `Arc`, as needed by
/// [`TrendingRanker::start_refresh_task`].
pub type SharedRanker = Arc<TrendingRanker>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
///
/// Import everything you need with a single line:
/// ```rust
/// use newsdesk::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical handler code.
    //!
    //! # Example
    //! ```rust
    //! use newsdesk::prelude::*;
    //!
    //! let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
    //! let policy = RateLimitPolicy::per_minutes("search", 30, 1);
    //! assert!(limiter.check("10.0.0.1", &policy).allowed);
    //! ```

    pub use crate::{
        derive_client_identity, HealthStatus, RankerConfig, RateLimitConfig, RateLimitPolicy,
        RateLimitResult, RateLimiter, RefreshOutcome, SharedRanker, SharedRateLimiter,
        TrendingRanker, COMMENTS, FORGOT_PASSWORD, LOGIN, NEWSLETTER, REGISTER,
    };
}

/// Builder for a [`RateLimiter`] with a hand-picked policy set.
///
/// Starts from an empty policy set, unlike `RateLimitConfig::default()`.
///
/// # Example
///
/// ```rust
/// use newsdesk::{RateLimiterBuilder, RateLimitPolicy, ConfigError};
///
/// let limiter = RateLimiterBuilder::new()
///     .policy(RateLimitPolicy::new("upload", 2, 10_000))
///     .build()
///     .unwrap();
/// assert!(limiter.policy("upload").is_some());
///
/// // Invalid policies are rejected at build time
/// let result = RateLimiterBuilder::new()
///     .policy(RateLimitPolicy::new("broken", 0, 1_000))
///     .build();
/// assert_eq!(result.unwrap_err(), ConfigError::ZeroMaxRequests("broken".into()));
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiterBuilder {
    config: RateLimitConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl RateLimiterBuilder {
    /// Creates a builder with no policies and the default sweep interval.
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::empty(),
            clock: None,
        }
    }

    /// Starts from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: RateLimitConfig) -> Self {
        Self { config, clock: None }
    }

    /// Adds or replaces a policy, keyed by its name.
    pub fn policy(mut self, policy: RateLimitPolicy) -> Self {
        self.config = self.config.with_policy(policy);
        self
    }

    /// Sets how often expired windows are swept.
    ///
    /// # Arguments
    ///
    /// * `ms` - Minimum time between sweeps in milliseconds (must be > 0)
    pub fn cleanup_interval_ms(mut self, ms: u64) -> Self {
        self.config = self.config.with_cleanup_interval_ms(ms);
        self
    }

    /// Reads time from `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the configuration and builds the limiter.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn build(self) -> Result<RateLimiter, ConfigError> {
        match self.clock {
            Some(clock) => RateLimiter::with_clock(self.config, clock),
            None => RateLimiter::new(self.config),
        }
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
