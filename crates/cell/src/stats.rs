//! Per-cell access counters
//!
//! Counters are relaxed atomics: they are diagnostics, not synchronization,
//! and a snapshot taken while callers are active may be slightly skewed.

use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a cell
#[derive(Debug, Default)]
pub struct CellStats {
    hits: AtomicU64,
    lock_acquisitions: AtomicU64,
    updates: AtomicU64,
    failed_updates: AtomicU64,
    skipped_updates: AtomicU64,
}

impl CellStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_lock_acquisition(&self) {
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed_update(&self) {
        self.failed_updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_skipped_update(&self) {
        self.skipped_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> CellStatsSnapshot {
        CellStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            lock_acquisitions: self.lock_acquisitions.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            failed_updates: self.failed_updates.load(Ordering::Relaxed),
            skipped_updates: self.skipped_updates.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a cell's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStatsSnapshot {
    /// Reads answered without touching the update lock
    ///
    /// Includes reads with a negative timeout.
    pub hits: u64,
    /// Times the update lock was taken by `get_or_update` or `set`
    pub lock_acquisitions: u64,
    /// Values published by a successful updater or `set`
    pub updates: u64,
    /// Updater invocations that failed
    pub failed_updates: u64,
    /// Lock holders that found the value already refreshed by another caller
    pub skipped_updates: u64,
}

impl CellStatsSnapshot {
    /// Fraction of reads served by the fast path (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.lock_acquisitions;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

impl Add for CellStatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            hits: self.hits + other.hits,
            lock_acquisitions: self.lock_acquisitions + other.lock_acquisitions,
            updates: self.updates + other.updates,
            failed_updates: self.failed_updates + other.failed_updates,
            skipped_updates: self.skipped_updates + other.skipped_updates,
        }
    }
}

impl std::iter::Sum for CellStatsSnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
