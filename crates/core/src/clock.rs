//! Millisecond time sources
//!
//! Cells stamp each published value with `Clock::now_millis()` and compare
//! that stamp against the caller's timeout. Timestamps are wall-clock
//! milliseconds since the Unix epoch.
//!
//! `NEVER_SET` (zero) is reserved: a cell stamped with it is expired for
//! every non-negative timeout.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Timestamp of a cell that has never been populated or was expired
pub const NEVER_SET: i64 = 0;

/// Source of the current time in milliseconds
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

/// Clock that only moves when told to
///
/// Used to drive expiration deterministically in tests and benchmarks.
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock reading `start_millis`
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    /// Move the clock forward by `millis`
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::AcqRel);
    }

    /// Set the clock to an absolute time
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::Release);
    }
}

impl Default for ManualClock {
    /// Starts at 1_000_000 ms so the first stamp is never `NEVER_SET`
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::Acquire)
    }
}
