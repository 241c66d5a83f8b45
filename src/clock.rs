//! # Time Sources
//!
//! Both subsystems read "now" through the [`Clock`] trait, so production code
//! runs on [`SystemClock`] while tests and simulations drive time explicitly
//! with [`ManualClock`].
//!
//! ```text
//!     SystemClock:
//!     ├─ wall-clock epoch captured once at first use
//!     └─ advanced by a monotonic Instant afterwards
//!
//!     ManualClock:
//!     ├─ starts at a caller-chosen millisecond value
//!     └─ moves only when set() / advance() is called
//! ```
//!
//! All instants are milliseconds since the UNIX epoch. Anchoring a monotonic
//! `Instant` to the epoch at startup keeps rate-limit windows stable when the
//! system clock is adjusted while the process is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch milliseconds at first use, paired with the Instant it was taken at.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

/// Source of the current time in milliseconds since the UNIX epoch.
///
/// Implementations must be cheap to call; `check` reads the clock on
/// every request.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// Returns the current time in milliseconds since UNIX epoch.
///
/// The value never goes backwards within a process.
///
/// # Example
///
/// ```rust
/// use newsdesk::current_time_ms;
///
/// let a = current_time_ms();
/// let b = current_time_ms();
/// assert!(b >= a);
/// ```
#[inline]
pub fn current_time_ms() -> u64 {
    let (start, base_ms) = START_TIME_BASE.get_or_init(|| {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        (Instant::now(), epoch_ms)
    });
    base_ms.saturating_add(start.elapsed().as_millis() as u64)
}

/// Process clock backed by [`current_time_ms`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// Clock that only moves when told to.
///
/// Share it through an `Arc` so a test can keep a handle while the limiter
/// or ranker owns another.
///
/// # Example
///
/// ```rust
/// use newsdesk::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now_ms(), 1_250);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock to an absolute instant.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Release);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let mut last = clock.now_ms();
        for _ in 0..1000 {
            let now = clock.now_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_system_clock_tracks_wall_time() {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let now = current_time_ms();

        // Same epoch, allow for scheduling noise
        assert!(now.abs_diff(wall) < 5_000);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.now_ms(), 0);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 2_000);

        clock.set(500);
        assert_eq!(clock.now_ms(), 500);
    }

    #[test]
    fn test_manual_clock_shared_across_threads() {
        let clock = Arc::new(ManualClock::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        clock.advance(Duration::from_millis(1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(clock.now_ms(), 400);
    }
}
