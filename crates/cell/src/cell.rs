//! CacheCell: a single stampede-free cache entry
//!
//! A cell holds the last successfully computed value together with the time
//! it was computed. Readers holding a fresh value never touch the update
//! lock. When the value is older than the caller's timeout, callers race for
//! the update lock and only the first of them recomputes.
//!
//! ## Update Protocol
//!
//! ```text
//! 1. timeout < 0                      -> return current value
//! 2. created_at != NEVER_SET AND
//!    now - timeout <= created_at      -> return current value (fast path)
//! 3. seen = created_at                   (read BEFORE locking)
//! 4. lock()
//! 5. IF created_at == seen OR created_at == NEVER_SET:
//!        run updater
//!        Ok  -> publish {value, now}
//!        Err -> unlock, return UpdateError (cell unchanged)
//! 6. unlock, return current value
//! ```
//!
//! Step 3 is what collapses a stampede: every caller that queued on the lock
//! behind the winner finds `created_at` moved past its own `seen` and skips
//! the updater.
//!
//! If the winner's updater fails, `created_at` does not move, so the callers
//! queued behind it run the updater themselves, one at a time, until one
//! succeeds or all have failed. Each failure is returned only to the caller
//! that ran that updater.
//!
//! ## Publication
//!
//! Value and timestamp live in one immutable snapshot record held in an
//! `ArcSwap`. Readers load the current record without locking; publishing
//! and expiring swap in a whole new record, so a reader can never observe a
//! value paired with another value's timestamp.
//!
//! Published stamps strictly increase: if the clock reads at or before the
//! previous stamp (a wall-clock step backwards), the new stamp is the
//! previous one plus one. A caller waiting on the lock therefore never
//! mistakes a fresh publication for the state it saw before locking.

use crate::stats::{CellStats, CellStatsSnapshot};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use strata_cache_core::{BoxError, Clock, SystemClock, UpdateError, NEVER_SET};
use tracing::{debug, trace};

/// Value and timestamp published together
struct Snapshot<V> {
    value: Option<Arc<V>>,
    created_at_millis: i64,
}

/// Lazily populated, time-expiring cache entry
///
/// Values are handed out as `Arc<V>` and are never mutated after
/// publication; an update replaces the whole value.
///
/// # Example
///
/// ```
/// use strata_cache_cell::CacheCell;
///
/// let cell: CacheCell<String> = CacheCell::new();
/// let value = cell
///     .get_or_update(60_000, || Ok::<_, std::io::Error>("computed".to_string()))
///     .unwrap();
/// assert_eq!(value.as_deref().map(String::as_str), Some("computed"));
/// ```
pub struct CacheCell<V, C = SystemClock> {
    current: ArcSwap<Snapshot<V>>,
    /// Held only while checking for and running an update
    update_lock: Mutex<()>,
    clock: C,
    stats: CellStats,
}

impl<V> CacheCell<V> {
    /// Create an empty cell that is expired for every timeout
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a cell holding `value`, stamped with the current time
    pub fn with_value(value: V) -> Self {
        Self::with_value_and_clock(value, SystemClock)
    }
}

impl<V> Default for CacheCell<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C: Clock> CacheCell<V, C> {
    /// Create an empty cell reading time from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                value: None,
                created_at_millis: NEVER_SET,
            }),
            update_lock: Mutex::new(()),
            clock,
            stats: CellStats::new(),
        }
    }

    /// Create a cell holding `value`, stamped with `clock`'s current time
    pub fn with_value_and_clock(value: V, clock: C) -> Self {
        let created_at_millis = clock.now_millis();
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                value: Some(Arc::new(value)),
                created_at_millis,
            }),
            update_lock: Mutex::new(()),
            clock,
            stats: CellStats::new(),
        }
    }

    /// Current value, without locking, expiry checks or updates
    #[inline]
    pub fn peek(&self) -> Option<Arc<V>> {
        self.current.load().value.clone()
    }

    /// Time of the last successful update in milliseconds
    ///
    /// Returns `NEVER_SET` for a cell that was never populated or has been
    /// expired.
    #[inline]
    pub fn created_at(&self) -> i64 {
        self.current.load().created_at_millis
    }

    /// Check whether the value is older than `timeout_millis`
    ///
    /// A negative timeout never expires.
    pub fn is_expired(&self, timeout_millis: i64) -> bool {
        timeout_millis >= 0 && self.has_expired(self.created_at(), timeout_millis)
    }

    /// Get the current value, recomputing it with `updater` if it is older
    /// than `timeout_millis`
    ///
    /// A negative `timeout_millis` disables expiry: the current value is
    /// returned as-is and `updater` is never called.
    ///
    /// # Returns
    /// - `Ok(Some(value))` with the fresh, refreshed or (when another caller
    ///   is mid-update) still-stale value
    /// - `Ok(None)` if the cell is empty and `timeout_millis` is negative
    /// - `Err(UpdateError)` if this call ran `updater` and it failed; the
    ///   cell keeps its previous value and timestamp
    ///
    /// # Blocking
    ///
    /// Blocks only when the value is expired, for as long as another caller
    /// holds the update lock. Neither the lock wait nor the updater is
    /// bounded.
    pub fn get_or_update<F, E>(
        &self,
        timeout_millis: i64,
        updater: F,
    ) -> Result<Option<Arc<V>>, UpdateError>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxError>,
    {
        let snapshot = self.current.load_full();
        if timeout_millis < 0 || !self.has_expired(snapshot.created_at_millis, timeout_millis) {
            self.stats.record_hit();
            return Ok(snapshot.value.clone());
        }

        let seen = snapshot.created_at_millis;
        trace!(seen, timeout_millis, "cache cell expired, waiting for update lock");

        let guard = self.update_lock.lock();
        self.stats.record_lock_acquisition();

        if self.should_update(seen) {
            let value = match updater() {
                Ok(value) => value,
                Err(e) => {
                    self.stats.record_failed_update();
                    drop(guard);
                    return Err(UpdateError::new(e));
                }
            };
            let created_at_millis = self.publish(value);
            debug!(created_at_millis, "cache cell updated");
        } else {
            self.stats.record_skipped_update();
            trace!(seen, "cache cell already refreshed by another caller");
        }
        drop(guard);

        Ok(self.peek())
    }

    /// Replace the value and stamp it with the current time
    ///
    /// Waits for any in-flight update to finish first, so an updater that
    /// started earlier cannot overwrite this value afterwards.
    pub fn set(&self, value: V) {
        let _guard = self.update_lock.lock();
        self.stats.record_lock_acquisition();
        self.publish(value);
    }

    /// Force the next `get_or_update` with a non-negative timeout to
    /// recompute
    ///
    /// Only the timestamp is reset; `peek()` keeps returning the old value
    /// until a new one is published.
    pub fn expire(&self) {
        // rcu retries if a publish lands between load and swap, so the
        // published value is never rolled back
        self.current.rcu(|current| Snapshot {
            value: current.value.clone(),
            created_at_millis: NEVER_SET,
        });
    }

    /// Counters describing how callers went through this cell
    pub fn stats(&self) -> CellStatsSnapshot {
        self.stats.snapshot()
    }

    /// `NEVER_SET` is expired for every timeout, including ones so large that
    /// `now - timeout` would precede the epoch
    #[inline]
    fn has_expired(&self, created_at_millis: i64, timeout_millis: i64) -> bool {
        created_at_millis == NEVER_SET
            || self.clock.now_millis().saturating_sub(timeout_millis) > created_at_millis
    }

    /// Must be called with the update lock held
    #[inline]
    fn should_update(&self, seen: i64) -> bool {
        let created_at_millis = self.created_at();
        created_at_millis == seen || created_at_millis == NEVER_SET
    }

    /// Must be called with the update lock held
    fn publish(&self, value: V) -> i64 {
        let previous = self.created_at();
        let created_at_millis = self.clock.now_millis().max(previous.saturating_add(1));
        self.current.store(Arc::new(Snapshot {
            value: Some(Arc::new(value)),
            created_at_millis,
        }));
        self.stats.record_update();
        created_at_millis
    }
}

impl<V: fmt::Debug, C> fmt::Debug for CacheCell<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current.load_full();
        f.debug_struct("CacheCell")
            .field("value", &snapshot.value)
            .field("created_at_millis", &snapshot.created_at_millis)
            .finish_non_exhaustive()
    }
}
