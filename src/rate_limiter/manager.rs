//! # Named-Policy Rate Limiter
//!
//! Front door for the request handlers: resolves policies, builds counter
//! keys, drives the store and keeps the expiry sweep on schedule.
//!
//! ## Architecture
//!
//! ```text
//!     Handlers (login, register, comments, newsletter, ...)
//!          │  check(identity, policy)
//!          ▼
//!     ┌───────────────┐      ┌──────────────────────┐
//!     │  RateLimiter  │ ───► │ RateLimitStore       │
//!     │  • policies   │      │  DashMap<key, entry> │
//!     │  • clock      │      └──────────────────────┘
//!     │  • metrics    │
//!     └───────┬───────┘
//!             │ sweep_if_due()  (at most once per cleanup interval)
//!             ▼
//!       expired entries dropped
//! ```
//!
//! ## Two Expiry Mechanisms
//!
//! 1. **Lazy expiry**: `check` treats an expired entry as absent. This is
//!    what makes the limiter correct.
//! 2. **Sweep**: bounds memory from identities that never come back. It runs
//!    opportunistically from `check` and from the optional cleanup thread,
//!    both gated by the same interval.

use super::{
    config::{RateLimitConfig, RateLimitPolicy},
    core::{RateLimitResult, RateLimitStore},
    metrics::{PolicyCounters, PolicyMetrics},
};
use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, RateLimitError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Applies named request ceilings to client identities.
///
/// Construct one per process, wrap it in an `Arc` and hand it to every
/// handler that needs throttling.
///
/// ## Usage
///
/// ```rust
/// use newsdesk::{RateLimiter, RateLimitConfig, LOGIN};
///
/// let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
///
/// let result = limiter.check_named("198.51.100.7", LOGIN).unwrap();
/// if !result.allowed {
///     // 429 Too Many Requests, Retry-After: result.retry_after_secs
/// }
/// assert_eq!(result.remaining, 4);
/// ```
pub struct RateLimiter {
    store: RateLimitStore,

    /// Validated policies by name.
    policies: HashMap<String, RateLimitPolicy>,

    /// Counters for configured policies; ad-hoc policies are not tracked.
    counters: HashMap<String, PolicyCounters>,

    clock: Arc<dyn Clock>,

    cleanup_interval_ms: u64,

    /// Clock reading of the last sweep, used as the sweep gate.
    last_sweep_ms: AtomicU64,

    /// Number of sweeps performed since startup.
    sweep_runs: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter on the system clock.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when any policy or the sweep interval is
    /// invalid, so misconfiguration surfaces at startup rather than at
    /// request time.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a limiter reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`RateLimiter::new`].
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        let counters = config
            .policies
            .keys()
            .map(|name| (name.clone(), PolicyCounters::default()))
            .collect();
        let now_ms = clock.now_ms();

        info!(
            "Rate limiter configured with {} policies (sweep interval: {}ms)",
            config.policies.len(),
            config.cleanup_interval_ms
        );

        Ok(Self {
            store: RateLimitStore::new(),
            policies: config.policies.into_iter().collect(),
            counters,
            clock,
            cleanup_interval_ms: config.cleanup_interval_ms,
            last_sweep_ms: AtomicU64::new(now_ms),
            sweep_runs: AtomicU64::new(0),
        })
    }

    /// Decides whether `identity` may perform an action under `policy`.
    ///
    /// Never fails: a denial is an ordinary result carrying a retry hint.
    /// The decision for one key is atomic with respect to concurrent callers.
    ///
    /// `policy` does not need to be registered with the limiter; metrics are
    /// recorded only for registered policies.
    pub fn check(&self, identity: &str, policy: &RateLimitPolicy) -> RateLimitResult {
        let now_ms = self.clock.now_ms();
        let result = self.store.check_and_increment(
            policy.key_for(identity),
            policy.max_requests,
            policy.window_ms,
            now_ms,
        );

        if let Some(counters) = self.counters.get(&policy.name) {
            counters.record(result.allowed);
        }
        if !result.allowed {
            debug!(
                "Throttled {} under policy {} (retry after {:?}s)",
                identity, policy.name, result.retry_after_secs
            );
        }

        self.sweep_if_due_at(now_ms);
        result
    }

    /// Looks up a configured policy by name and checks `identity` against it.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::UnknownPolicy`] if no policy has that name.
    pub fn check_named(&self, identity: &str, policy: &str) -> Result<RateLimitResult, RateLimitError> {
        let policy = self.require_policy(policy)?;
        Ok(self.check(identity, policy))
    }

    /// Reports what the next `check` would see without consuming budget.
    pub fn peek(&self, identity: &str, policy: &RateLimitPolicy) -> RateLimitResult {
        self.store.peek(
            &policy.key_for(identity),
            policy.max_requests,
            policy.window_ms,
            self.clock.now_ms(),
        )
    }

    /// Named variant of [`RateLimiter::peek`].
    ///
    /// # Errors
    ///
    /// [`RateLimitError::UnknownPolicy`] if no policy has that name.
    pub fn peek_named(&self, identity: &str, policy: &str) -> Result<RateLimitResult, RateLimitError> {
        let policy = self.require_policy(policy)?;
        Ok(self.peek(identity, policy))
    }

    /// Forgets the counter of `identity` under `policy`.
    ///
    /// Returns whether a counter existed. Typical use: clearing failed login
    /// attempts after a successful sign-in.
    pub fn reset(&self, identity: &str, policy: &RateLimitPolicy) -> bool {
        self.store.remove(&policy.key_for(identity))
    }

    /// Returns a configured policy.
    #[inline]
    pub fn policy(&self, name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(name)
    }

    fn require_policy(&self, name: &str) -> Result<&RateLimitPolicy, RateLimitError> {
        self.policies
            .get(name)
            .ok_or_else(|| RateLimitError::UnknownPolicy(name.to_string()))
    }

    /// Removes every expired entry now, regardless of the sweep interval.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now_ms = self.clock.now_ms();
        self.last_sweep_ms.store(now_ms, Ordering::Release);
        self.run_sweep(now_ms)
    }

    /// Sweeps if at least one cleanup interval passed since the last sweep.
    ///
    /// Returns `Some(removed)` when this call performed the sweep.
    pub fn sweep_if_due(&self) -> Option<usize> {
        self.sweep_if_due_at(self.clock.now_ms())
    }

    fn sweep_if_due_at(&self, now_ms: u64) -> Option<usize> {
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < self.cleanup_interval_ms {
            return None;
        }

        // Only the caller that moves the gate forward sweeps
        self.last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .ok()?;

        Some(self.run_sweep(now_ms))
    }

    fn run_sweep(&self, now_ms: u64) -> usize {
        let removed = self.store.sweep(now_ms);
        self.sweep_runs.fetch_add(1, Ordering::Relaxed);

        if removed > 0 {
            info!(
                "Sweep removed {} expired rate limit entries ({} remain)",
                removed,
                self.store.len()
            );
        }
        removed
    }

    /// Drops every counter. Intended for tests and emergency resets.
    pub fn clear(&self) {
        let count = self.store.clear();
        info!("Cleared all {} rate limit entries", count);
    }

    /// Number of stored counter entries.
    #[inline]
    pub fn active_entries(&self) -> usize {
        self.store.len()
    }

    /// Traffic counters for a configured policy.
    pub fn metrics(&self, policy: &str) -> Option<PolicyMetrics> {
        self.counters
            .get(policy)
            .map(|counters| counters.snapshot(policy))
    }

    /// Store-level statistics.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            active_entries: self.store.len(),
            total_created: self.store.total_created(),
            total_swept: self.store.total_swept(),
            sweep_runs: self.sweep_runs.load(Ordering::Relaxed),
            policies: self.policies.len(),
        }
    }

    /// Starts a background thread that sweeps on the cleanup interval.
    ///
    /// The thread stops when the returned sender fires or is dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use newsdesk::{RateLimiter, RateLimitConfig};
    /// use std::sync::Arc;
    ///
    /// let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()).unwrap());
    /// let (handle, stop_tx) = limiter.clone().start_cleanup_thread().unwrap();
    ///
    /// stop_tx.send(()).unwrap();
    /// handle.join().unwrap();
    /// ```
    pub fn start_cleanup_thread(
        self: Arc<Self>,
    ) -> std::io::Result<(thread::JoinHandle<()>, mpsc::Sender<()>)> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let limiter = self;

        let handle = thread::Builder::new()
            .name("newsdesk-sweep".to_string())
            .spawn(move || {
                info!(
                    "Started rate limit sweep thread (interval: {}ms)",
                    limiter.cleanup_interval_ms
                );

                loop {
                    match stop_rx.recv_timeout(Duration::from_millis(limiter.cleanup_interval_ms)) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Rate limit sweep thread stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            limiter.sweep_if_due();
                        }
                    }
                }
            })?;

        Ok((handle, stop_tx))
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policies", &self.policies.len())
            .field("active_entries", &self.active_entries())
            .field("cleanup_interval_ms", &self.cleanup_interval_ms)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Store statistics for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    /// Entries currently stored, including expired ones not yet swept.
    pub active_entries: usize,

    /// Windows created for new keys since startup.
    pub total_created: u64,

    /// Entries removed by sweeps since startup.
    pub total_swept: u64,

    /// Sweeps performed since startup.
    pub sweep_runs: u64,

    /// Configured policies.
    pub policies: usize,
}

impl LimiterStats {
    /// Human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Rate Limiter Stats:\n\
             ├─ Policies: {}\n\
             ├─ Active Entries: {}\n\
             └─ Lifetime:\n\
                ├─ Total Created: {}\n\
                ├─ Total Swept: {}\n\
                └─ Sweep Runs: {}",
            self.policies,
            self.active_entries,
            self.total_created,
            self.total_swept,
            self.sweep_runs
        )
    }
}

impl std::fmt::Display for LimiterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limiter::config::{COMMENTS, LOGIN};

    fn limiter_with(policy: RateLimitPolicy, clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::with_clock(RateLimitConfig::empty().with_policy(policy), clock).unwrap()
    }

    #[test]
    fn test_concrete_window_scenario() {
        let clock = Arc::new(ManualClock::new(0));
        let policy = RateLimitPolicy::new("test", 3, 1000);
        let limiter = limiter_with(policy.clone(), clock.clone());
        let ip = "1.2.3.4";

        for (t, remaining) in [(0, 2), (100, 1), (200, 0)] {
            clock.set(t);
            let result = limiter.check(ip, &policy);
            assert!(result.allowed, "t={}", t);
            assert_eq!(result.remaining, remaining, "t={}", t);
        }

        clock.set(300);
        let denied = limiter.check(ip, &policy);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after_secs, Some(1));

        clock.set(1050);
        let fresh = limiter.check(ip, &policy);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
    }

    #[test]
    fn test_identities_do_not_share_budget() {
        let clock = Arc::new(ManualClock::new(0));
        let policy = RateLimitPolicy::new("test", 2, 1000);
        let limiter = limiter_with(policy.clone(), clock);

        limiter.check("a", &policy);
        limiter.check("a", &policy);
        assert!(!limiter.check("a", &policy).allowed);

        let b = limiter.check("b", &policy);
        assert!(b.allowed);
        assert_eq!(b.remaining, 1);
    }

    #[test]
    fn test_policies_do_not_share_counters() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(RateLimitConfig::default(), clock).unwrap();

        for _ in 0..5 {
            assert!(limiter.check_named("9.9.9.9", LOGIN).unwrap().allowed);
        }
        assert!(!limiter.check_named("9.9.9.9", LOGIN).unwrap().allowed);

        let comment = limiter.check_named("9.9.9.9", COMMENTS).unwrap();
        assert!(comment.allowed);
        assert_eq!(comment.remaining, 9);
    }

    #[test]
    fn test_unknown_policy() {
        let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
        assert_eq!(
            limiter.check_named("x", "upload"),
            Err(RateLimitError::UnknownPolicy("upload".to_string()))
        );
        assert!(limiter.peek_named("x", "upload").is_err());
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = RateLimitConfig::empty().with_policy(RateLimitPolicy::new("bad", 0, 1000));
        assert!(matches!(
            RateLimiter::new(config),
            Err(ConfigError::ZeroMaxRequests(_))
        ));
    }

    #[test]
    fn test_peek_and_reset() {
        let clock = Arc::new(ManualClock::new(0));
        let policy = RateLimitPolicy::new(LOGIN, 2, 60_000);
        let limiter = limiter_with(policy.clone(), clock);

        limiter.check("ip", &policy);
        limiter.check("ip", &policy);
        assert!(!limiter.peek("ip", &policy).allowed);
        assert_eq!(limiter.metrics(LOGIN).unwrap().total(), 2);

        assert!(limiter.reset("ip", &policy));
        let after = limiter.peek("ip", &policy);
        assert!(after.allowed);
        assert_eq!(after.remaining, 2);
    }

    #[test]
    fn test_metrics_recorded_per_policy() {
        let clock = Arc::new(ManualClock::new(0));
        let policy = RateLimitPolicy::new(LOGIN, 1, 60_000);
        let limiter = limiter_with(policy.clone(), clock);

        limiter.check("a", &policy);
        limiter.check("a", &policy);
        limiter.check("a", &policy);

        let metrics = limiter.metrics(LOGIN).unwrap();
        assert_eq!(metrics.allowed, 1);
        assert_eq!(metrics.denied, 2);
        assert!(limiter.metrics(COMMENTS).is_none());
    }

    #[test]
    fn test_ad_hoc_policy_is_enforced_but_not_tracked() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(RateLimitConfig::empty(), clock).unwrap();
        let policy = RateLimitPolicy::new("adhoc", 1, 1000);

        assert!(limiter.check("a", &policy).allowed);
        assert!(!limiter.check("a", &policy).allowed);
        assert!(limiter.metrics("adhoc").is_none());
    }

    #[test]
    fn test_sweep_gated_by_interval() {
        let clock = Arc::new(ManualClock::new(0));
        let config = RateLimitConfig::empty()
            .with_policy(RateLimitPolicy::new("short", 5, 100))
            .with_cleanup_interval_ms(60_000);
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
        let policy = limiter.policy("short").unwrap().clone();

        for i in 0..10 {
            limiter.check(&format!("10.0.0.{}", i), &policy);
        }
        assert_eq!(limiter.active_entries(), 10);

        // Entries expired, but the interval has not elapsed
        clock.set(30_000);
        assert_eq!(limiter.sweep_if_due(), None);
        assert_eq!(limiter.active_entries(), 10);

        clock.set(60_000);
        assert_eq!(limiter.sweep_if_due(), Some(10));
        assert_eq!(limiter.active_entries(), 0);

        // Immediately after a sweep the gate is closed again
        assert_eq!(limiter.sweep_if_due(), None);
        assert_eq!(limiter.stats().sweep_runs, 1);
    }

    #[test]
    fn test_check_triggers_due_sweep() {
        let clock = Arc::new(ManualClock::new(0));
        let config = RateLimitConfig::empty()
            .with_policy(RateLimitPolicy::new("short", 5, 100))
            .with_cleanup_interval_ms(1_000);
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
        let policy = limiter.policy("short").unwrap().clone();

        limiter.check("stale", &policy);
        clock.set(5_000);
        limiter.check("fresh", &policy);

        assert_eq!(limiter.active_entries(), 1);
        assert_eq!(limiter.stats().total_swept, 1);
    }

    #[test]
    fn test_stats_and_clear() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(RateLimitConfig::default(), clock).unwrap();

        for i in 0..4 {
            limiter.check_named(&format!("172.16.0.{}", i), COMMENTS).unwrap();
        }

        let stats = limiter.stats();
        assert_eq!(stats.active_entries, 4);
        assert_eq!(stats.total_created, 4);
        assert_eq!(stats.policies, 5);
        assert!(stats.summary().contains("Active Entries: 4"));

        limiter.clear();
        assert_eq!(limiter.active_entries(), 0);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_ceiling() {
        let clock = Arc::new(ManualClock::new(0));
        let policy = RateLimitPolicy::new(COMMENTS, 10, 60_000);
        let limiter = Arc::new(limiter_with(policy.clone(), clock));
        let mut handles = vec![];

        for _ in 0..16 {
            let limiter = limiter.clone();
            let policy = policy.clone();
            handles.push(thread::spawn(move || {
                (0..20)
                    .filter(|_| limiter.check("unknown", &policy).allowed)
                    .count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
        assert_eq!(limiter.metrics(COMMENTS).unwrap().denied, 16 * 20 - 10);
    }

    #[test]
    fn test_cleanup_thread_sweeps_and_stops() {
        let clock = Arc::new(ManualClock::new(0));
        let config = RateLimitConfig::empty()
            .with_policy(RateLimitPolicy::new("short", 5, 10))
            .with_cleanup_interval_ms(20);
        let limiter = Arc::new(RateLimiter::with_clock(config, clock.clone()).unwrap());
        let policy = limiter.policy("short").unwrap().clone();

        for i in 0..5 {
            limiter.check(&format!("192.168.0.{}", i), &policy);
        }
        clock.set(1_000);

        let (handle, stop_tx) = limiter.clone().start_cleanup_thread().unwrap();
        thread::sleep(Duration::from_millis(150));

        stop_tx.send(()).unwrap();
        handle.join().unwrap();

        assert_eq!(limiter.active_entries(), 0);
    }
}
