//! Error types for configuration, throttling and refresh cycles.
//!
//! Throttling itself is not an error: a denied request is an ordinary
//! [`RateLimitResult`](crate::RateLimitResult) with `allowed == false`.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid rate-limit configuration, reported at load time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Policy name is empty
    #[error("rate limit policy name must not be empty")]
    EmptyPolicyName,

    /// Policy ceiling is zero
    #[error("policy `{0}`: max_requests must be greater than 0")]
    ZeroMaxRequests(String),

    /// Policy window is zero
    #[error("policy `{0}`: window_ms must be greater than 0")]
    ZeroWindow(String),

    /// Policy registered under a key that differs from its own name
    #[error("policy registered as `{key}` but named `{name}`")]
    NameMismatch {
        /// Map key the policy was stored under
        key: String,
        /// Name carried by the policy itself
        name: String,
    },

    /// Sweep interval is zero
    #[error("cleanup_interval_ms must be greater than 0")]
    ZeroCleanupInterval,

    /// Leaderboard size is zero
    #[error("trending k must be greater than 0")]
    ZeroTopK,

    /// Trending window is zero
    #[error("trending window_hours must be greater than 0")]
    ZeroTrendingWindow,

    /// Refresh deadline is zero
    #[error("refresh_timeout_ms must be greater than 0")]
    ZeroRefreshTimeout,
}

/// Misuse of the rate limiter API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// No policy with this name was configured
    #[error("unknown rate limit policy `{0}`")]
    UnknownPolicy(String),
}

/// Stage of a refresh cycle that talks to a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    /// Reading the view-event window
    EventRead,
    /// Reading the lifetime-view fallback ordering
    FallbackRead,
    /// Reading the currently ranked slugs
    RankRead,
    /// Writing the new rank assignment
    RankWrite,
}

impl std::fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EventRead => "event read",
            Self::FallbackRead => "fallback read",
            Self::RankRead => "rank read",
            Self::RankWrite => "rank write",
        };
        f.write_str(name)
    }
}

/// Failed refresh cycle. Previously persisted ranks are left untouched.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// View-event window could not be read
    #[error("failed to read view events: {0}")]
    EventRead(#[source] BoxError),

    /// Lifetime-view ordering could not be read
    #[error("failed to read lifetime view order: {0}")]
    FallbackRead(#[source] BoxError),

    /// Currently ranked slugs could not be read
    #[error("failed to read current ranks: {0}")]
    RankRead(#[source] BoxError),

    /// Rank assignment could not be written
    #[error("failed to apply rank assignment: {0}")]
    RankWrite(#[source] BoxError),

    /// A collaborator call exceeded the refresh deadline
    #[error("{stage} exceeded the refresh deadline of {deadline:?}")]
    Timeout {
        /// Stage that timed out
        stage: RefreshStage,
        /// Deadline that was exceeded
        deadline: Duration,
    },
}

impl RefreshError {
    /// Stage the failure happened in.
    pub fn stage(&self) -> RefreshStage {
        match self {
            Self::EventRead(_) => RefreshStage::EventRead,
            Self::FallbackRead(_) => RefreshStage::FallbackRead,
            Self::RankRead(_) => RefreshStage::RankRead,
            Self::RankWrite(_) => RefreshStage::RankWrite,
            Self::Timeout { stage, .. } => *stage,
        }
    }
}
