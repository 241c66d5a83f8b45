//! # Policy Metrics
//!
//! Per-policy counters of admitted and denied requests, with derived rates
//! and a coarse health assessment.
//!
//! ```text
//!     Policy "login":
//!     ┌─────────────────────────────────────┐
//!     │  Allowed: 940   Denied: 60          │
//!     │  Success Rate: 94%                  │
//!     │  ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓░  (940/1000)   │
//!     │  Health: Healthy                    │
//!     └─────────────────────────────────────┘
//! ```
//!
//! A high rejection rate on `login` usually means credential stuffing from a
//! shared identity bucket, not a misconfigured ceiling.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Rejection ratio above which a policy is reported as critical.
const CRITICAL_REJECTION_RATIO: f64 = 0.3;

/// Consecutive denials above which a policy is reported as critical.
const CRITICAL_CONSECUTIVE_DENIALS: u32 = 50;

/// Live counters for one policy.
#[derive(Debug, Default)]
pub(crate) struct PolicyCounters {
    allowed: AtomicU64,
    denied: AtomicU64,
    consecutive_denials: AtomicU32,
}

impl PolicyCounters {
    #[inline]
    pub(crate) fn record(&self, allowed: bool) {
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
            if self.consecutive_denials.load(Ordering::Relaxed) > 0 {
                self.consecutive_denials.store(0, Ordering::Relaxed);
            }
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
            self.consecutive_denials.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, policy: &str) -> PolicyMetrics {
        PolicyMetrics {
            policy: policy.to_string(),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            consecutive_denials: self.consecutive_denials.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one policy's traffic.
///
/// # Example
///
/// ```rust
/// use newsdesk::{HealthStatus, RateLimiter, RateLimitConfig};
///
/// let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
/// limiter.check_named("203.0.113.9", "login").unwrap();
///
/// let metrics = limiter.metrics("login").unwrap();
/// assert_eq!(metrics.allowed, 1);
/// assert_eq!(metrics.health_status(), HealthStatus::Healthy);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyMetrics {
    /// Policy name.
    pub policy: String,

    /// Requests admitted since startup.
    pub allowed: u64,

    /// Requests denied since startup.
    pub denied: u64,

    /// Denials since the last admitted request, across all identities.
    pub consecutive_denials: u32,
}

impl PolicyMetrics {
    /// Total checks recorded.
    #[inline]
    pub fn total(&self) -> u64 {
        self.allowed + self.denied
    }

    /// Fraction of checks admitted, 1.0 when nothing was checked yet.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            1.0
        } else {
            self.allowed as f64 / total as f64
        }
    }

    /// Fraction of checks denied.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// Coarse health derived from the rejection pattern.
    pub fn health_status(&self) -> HealthStatus {
        if self.rejection_rate() > CRITICAL_REJECTION_RATIO
            || self.consecutive_denials > CRITICAL_CONSECUTIVE_DENIALS
        {
            HealthStatus::Critical
        } else if self.denied > 0 && self.consecutive_denials > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Human-readable report for logs.
    pub fn summary(&self) -> String {
        format!(
            "Policy `{}` Metrics:\n\
             ├─ Allowed: {}\n\
             ├─ Denied: {}\n\
             ├─ Success Rate: {:.2}%\n\
             ├─ Consecutive Denials: {}\n\
             └─ Status: {:?}",
            self.policy,
            self.allowed,
            self.denied,
            self.success_rate() * 100.0,
            self.consecutive_denials,
            self.health_status()
        )
    }
}

impl fmt::Display for PolicyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Health indicator for a policy.
///
/// ```text
///     Healthy ──────► no denial streak in progress
///        │
///     Degraded ─────► identities are currently being throttled
///        │
///     Critical ─────► sustained throttling, worth an alert
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No denial streak in progress.
    Healthy,

    /// Some identities are currently being throttled.
    Degraded,

    /// Rejection ratio or denial streak beyond alerting thresholds.
    Critical,
}

impl HealthStatus {
    /// Short operator hint for the status.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Watch for abusive identities",
            Self::Critical => "Investigate traffic source or raise the ceiling",
        }
    }
}
