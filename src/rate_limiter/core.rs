//! # Fixed-Window Counter Store
//!
//! The store maps a counter key (`"<policy>:<identity>"`) to the state of its
//! current window and performs the whole check-and-increment decision inside
//! one critical section.
//!
//! ```text
//!     check_and_increment(key):
//!
//!     DashMap shard lock ─┐
//!                         ▼
//!     ┌──────────────┐  absent / expired   ┌────────────────────────┐
//!     │ entry(key)   │ ──────────────────► │ count = 1, reset = now+W│ ✅
//!     └──────┬───────┘                     └────────────────────────┘
//!            │ live window
//!            ▼
//!     count >= max ? ──Yes──► ❌ denied (count unchanged)
//!            │
//!            No
//!            ▼
//!       count += 1 ──────────► ✅ allowed
//! ```
//!
//! ## Atomicity
//!
//! `DashMap::entry` holds the write lock of the key's shard for the whole
//! decision, so two callers racing for the last slot of a window are
//! serialized: exactly one is admitted.
//!
//! ## Expiry
//!
//! An entry whose `reset_time_ms` has passed is treated as absent by every
//! read. [`RateLimitStore::sweep`] only reclaims memory.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Expected number of live keys used to pre-size the map.
const INITIAL_CAPACITY: usize = 1024;

/// State of one counter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests admitted in the current window.
    pub count: u32,

    /// Instant (ms since epoch) at which the window ends.
    pub reset_time_ms: u64,
}

impl RateLimitEntry {
    /// An entry is expired strictly after its reset time.
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.reset_time_ms
    }
}

/// Outcome of a rate-limit check.
///
/// # Example
///
/// ```rust
/// use newsdesk::{ManualClock, RateLimitConfig, RateLimitPolicy, RateLimiter};
/// use std::sync::Arc;
///
/// let policy = RateLimitPolicy::new("login", 1, 60_000);
/// let limiter = RateLimiter::with_clock(
///     RateLimitConfig::empty().with_policy(policy.clone()),
///     Arc::new(ManualClock::new(0)),
/// )
/// .unwrap();
///
/// assert!(limiter.check("10.0.0.1", &policy).allowed);
///
/// let denied = limiter.check("10.0.0.1", &policy);
/// assert!(!denied.allowed);
/// assert_eq!(denied.retry_after_secs, Some(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Requests still admissible in this window.
    pub remaining: u32,

    /// Instant (ms since epoch) at which the window resets.
    pub reset_time_ms: u64,

    /// Seconds until a retry can succeed. Set only on denial, always >= 1.
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    #[inline]
    fn allowed(remaining: u32, reset_time_ms: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_time_ms,
            retry_after_secs: None,
        }
    }

    #[inline]
    fn denied(reset_time_ms: u64, now_ms: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time_ms,
            retry_after_secs: Some(retry_after_secs(reset_time_ms, now_ms)),
        }
    }
}

/// Whole seconds until `reset_time_ms`, rounded up and never below one.
#[inline]
pub(crate) fn retry_after_secs(reset_time_ms: u64, now_ms: u64) -> u64 {
    let wait_ms = reset_time_ms.saturating_sub(now_ms);
    wait_ms.div_ceil(1000).max(1)
}

/// Concurrent map of counter windows.
///
/// The store knows nothing about policy names; callers pass the ceiling and
/// window with every call. [`RateLimiter`](crate::RateLimiter) is the usual
/// entry point.
pub struct RateLimitStore {
    /// Counter windows keyed by `"<policy>:<identity>"`.
    entries: DashMap<String, RateLimitEntry, ahash::RandomState>,

    /// Windows created for previously unseen keys.
    total_created: AtomicU64,

    /// Entries removed by sweeps.
    total_swept: AtomicU64,
}

impl RateLimitStore {
    /// Creates an empty store sharded for the host's parallelism.
    pub fn new() -> Self {
        // More shards = less contention on hot identities
        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .next_power_of_two()
            .clamp(4, 64);

        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(
                INITIAL_CAPACITY,
                ahash::RandomState::new(),
                num_shards,
            ),
            total_created: AtomicU64::new(0),
            total_swept: AtomicU64::new(0),
        }
    }

    /// Counts one request against `key` and decides whether it is admitted.
    ///
    /// Denied requests leave the count untouched. A `max_requests` of zero
    /// denies everything without creating an entry.
    pub fn check_and_increment(
        &self,
        key: String,
        max_requests: u32,
        window_ms: u64,
        now_ms: u64,
    ) -> RateLimitResult {
        if max_requests == 0 {
            return RateLimitResult::denied(now_ms.saturating_add(window_ms), now_ms);
        }

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();

                if entry.is_expired(now_ms) {
                    *entry = RateLimitEntry {
                        count: 1,
                        reset_time_ms: now_ms.saturating_add(window_ms),
                    };
                    return RateLimitResult::allowed(max_requests - 1, entry.reset_time_ms);
                }

                if entry.count >= max_requests {
                    return RateLimitResult::denied(entry.reset_time_ms, now_ms);
                }

                entry.count += 1;
                RateLimitResult::allowed(max_requests - entry.count, entry.reset_time_ms)
            }
            Entry::Vacant(vacant) => {
                let reset_time_ms = now_ms.saturating_add(window_ms);
                vacant.insert(RateLimitEntry {
                    count: 1,
                    reset_time_ms,
                });
                self.total_created.fetch_add(1, Ordering::Relaxed);
                RateLimitResult::allowed(max_requests - 1, reset_time_ms)
            }
        }
    }

    /// Reports what the next request for `key` would see, without counting it.
    ///
    /// For an absent or expired key, `reset_time_ms` is when a window opened
    /// now would end.
    pub fn peek(&self, key: &str, max_requests: u32, window_ms: u64, now_ms: u64) -> RateLimitResult {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now_ms) => {
                if entry.count >= max_requests {
                    RateLimitResult::denied(entry.reset_time_ms, now_ms)
                } else {
                    RateLimitResult::allowed(max_requests - entry.count, entry.reset_time_ms)
                }
            }
            _ if max_requests == 0 => {
                RateLimitResult::denied(now_ms.saturating_add(window_ms), now_ms)
            }
            _ => RateLimitResult::allowed(max_requests, now_ms.saturating_add(window_ms)),
        }
    }

    /// Returns a copy of the live entry for `key`, if any.
    pub fn get(&self, key: &str, now_ms: u64) -> Option<RateLimitEntry> {
        self.entries
            .get(key)
            .map(|entry| *entry)
            .filter(|entry| !entry.is_expired(now_ms))
    }

    /// Drops the counter for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry expired at `now_ms`, one shard at a time.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now_ms);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            self.total_swept.fetch_add(removed as u64, Ordering::Relaxed);
        }
        self.shrink_if_oversized();
        removed
    }

    /// Shrinks the map after large sweeps.
    fn shrink_if_oversized(&self) {
        let len = self.entries.len();
        let capacity = self.entries.capacity();
        if capacity > len * 4 && capacity > INITIAL_CAPACITY * 4 {
            self.entries.shrink_to_fit();
        }
    }

    /// Number of stored entries, expired or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Windows created for new keys since startup.
    #[inline]
    pub fn total_created(&self) -> u64 {
        self.total_created.load(Ordering::Relaxed)
    }

    /// Entries removed by sweeps since startup.
    #[inline]
    pub fn total_swept(&self) -> u64 {
        self.total_swept.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitStore")
            .field("entries", &self.entries.len())
            .field("total_created", &self.total_created())
            .field("total_swept", &self.total_swept())
            .finish()
    }
}
