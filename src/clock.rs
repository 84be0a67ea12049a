//! Time sources for policy evaluation.
//!
//! Every timestamp the register stores is a millisecond count on a
//! monotonic clock whose zero is the moment the clock was created.  Wall
//! time is never consulted, so policies are immune to clock adjustments.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic millisecond clock.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    /// Milliseconds elapsed since the clock's epoch.  Never decreases.
    fn now_ms(&self) -> u64;
}

/// Production clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying counter, so a test can keep one clone and
/// hand the other to the register.
///
/// ```
/// use objreg::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// clock.advance(Duration::from_millis(150));
/// assert_eq!(clock.now_ms(), 150);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: std::sync::Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Moves the clock to `ms`.  Ignored if that would go backwards.
    pub fn set_ms(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
