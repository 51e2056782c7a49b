//! Keyed cache entry point for stratacache.
//!
//! This module provides `Cache`, a concurrent map from key to `CacheCell`
//! that owns its cells and hands every lookup to the key's cell.

use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use strata_cache_cell::{
    get_or_update_with, BoxError, CacheCell, CellStatsSnapshot, Clock, SystemClock,
};
use tracing::debug;

/// Default entry timeout: 60 seconds
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Concurrent, stampede-free cache.
///
/// Each key owns one [`CacheCell`]. Looking up a missing or expired key runs
/// the supplied updater, and concurrent lookups of the same key wait for
/// that single run instead of starting their own.
///
/// The cache is unbounded: entries stay until [`Cache::remove`]d.
///
/// # Example
///
/// ```
/// use stratacache::prelude::*;
///
/// let cache: Cache<String, u64> = Cache::builder()
///     .timeout(std::time::Duration::from_secs(30))
///     .build()?;
///
/// let value = cache.get(&"answer".to_string(), || Ok::<_, std::io::Error>(42))?;
/// assert_eq!(value.as_deref(), Some(&42));
/// # Ok::<(), stratacache::Error>(())
/// ```
pub struct Cache<K, V, C = SystemClock> {
    cells: DashMap<K, Arc<CacheCell<V, C>>>,
    /// Negative disables expiry
    timeout_millis: i64,
    clock: C,
}

impl<K: Eq + Hash, V> Cache<K, V> {
    /// Create a cache with default settings.
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            timeout_millis: DEFAULT_TIMEOUT.as_millis() as i64,
            clock: SystemClock,
        }
    }

    /// Create a builder for cache configuration.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }
}

impl<K: Eq + Hash, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> Cache<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock + Clone,
{
    /// Get the value for `key`, computing it with `updater` when the key is
    /// new or its value is older than the configured timeout.
    ///
    /// Returns `Ok(None)` only when expiry is disabled with a negative
    /// timeout and the key has never been populated.
    ///
    /// # Errors
    ///
    /// `Error::Update` if this call ran `updater` and it failed. The entry
    /// keeps its previous value; a later call retries.
    pub fn get<F, E>(&self, key: &K, updater: F) -> Result<Option<Arc<V>>>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: Into<BoxError>,
    {
        self.get_with_timeout(key, self.timeout_millis, updater)
    }

    /// Like [`Cache::get`], with a timeout for this call only.
    ///
    /// A negative `timeout_millis` returns whatever is cached without ever
    /// calling `updater`.
    pub fn get_with_timeout<F, E>(
        &self,
        key: &K,
        timeout_millis: i64,
        updater: F,
    ) -> Result<Option<Arc<V>>>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: Into<BoxError>,
    {
        get_or_update_with(&self.cells, key, timeout_millis, updater, || {
            CacheCell::with_clock(self.clock.clone())
        })
        .map_err(Error::from)
    }

    /// Current value for `key`, without expiry checks or updates.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.cell(key).and_then(|cell| cell.peek())
    }

    /// Store `value` for `key` with a fresh timestamp.
    ///
    /// If `key` is being recomputed, waits for that to finish and then
    /// replaces its result.
    pub fn insert(&self, key: K, value: V) {
        let cell = match self.cells.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(CacheCell::with_value_and_clock(
                    value,
                    self.clock.clone(),
                )));
                return;
            }
        };
        // Shard guard released above; `set` may wait on a running updater
        cell.set(value);
    }

    /// Mark `key` expired so the next `get` recomputes it.
    ///
    /// The old value stays visible to `peek` until then. Returns `false` if
    /// the key is not cached.
    pub fn invalidate(&self, key: &K) -> bool {
        match self.cell(key) {
            Some(cell) => {
                cell.expire();
                debug!("invalidated cache entry");
                true
            }
            None => false,
        }
    }

    /// Mark every entry expired.
    pub fn invalidate_all(&self) {
        for entry in self.cells.iter() {
            entry.value().expire();
        }
        debug!(entries = self.cells.len(), "invalidated all cache entries");
    }

    /// Drop `key` from the cache, returning its last value.
    ///
    /// A caller already inside the removed cell finishes against it; the
    /// next lookup starts from a new, empty cell.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        let (_, cell) = self.cells.remove(key)?;
        debug!("removed cache entry");
        cell.peek()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cells.clear();
        debug!("cleared cache");
    }

    /// The cell backing `key`, if cached.
    pub fn cell(&self, key: &K) -> Option<Arc<CacheCell<V, C>>> {
        self.cells.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if `key` has a cell, populated or not.
    pub fn contains_key(&self, key: &K) -> bool {
        self.cells.contains_key(key)
    }

    /// Number of cached keys, including ones whose first update failed.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if no key is cached.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Configured timeout in milliseconds; negative means never.
    pub fn timeout_millis(&self) -> i64 {
        self.timeout_millis
    }

    /// Counters summed over every cached cell.
    ///
    /// Counters of removed cells are lost.
    pub fn stats(&self) -> CacheStats {
        let cells: CellStatsSnapshot = self.cells.iter().map(|entry| entry.value().stats()).sum();
        CacheStats {
            entries: self.cells.len(),
            hits: cells.hits,
            lock_acquisitions: cells.lock_acquisitions,
            updates: cells.updates,
            failed_updates: cells.failed_updates,
            skipped_updates: cells.skipped_updates,
            hit_rate: cells.hit_rate(),
        }
    }
}

impl<K, V, C> fmt::Debug for Cache<K, V, C>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.cells.len())
            .field("timeout_millis", &self.timeout_millis)
            .finish_non_exhaustive()
    }
}

/// Cache metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Cached keys
    pub entries: usize,
    /// Lookups answered without waiting on an update lock
    pub hits: u64,
    /// Lookups and inserts that took an update lock
    pub lock_acquisitions: u64,
    /// Values published
    pub updates: u64,
    /// Updater runs that failed
    pub failed_updates: u64,
    /// Lookups that found the value refreshed while they waited
    pub skipped_updates: u64,
    /// Fast-path share of lookups (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Builder for cache configuration.
///
/// # Example
///
/// ```
/// use stratacache::prelude::*;
/// use std::time::Duration;
///
/// // Refresh entries older than five minutes
/// let cache: Cache<u32, String> = Cache::builder()
///     .timeout(Duration::from_secs(300))
///     .capacity(1_024)
///     .build()?;
///
/// // Compute once, keep until invalidated
/// let pinned: Cache<u32, String> = Cache::builder().never_expire().build()?;
/// # Ok::<(), stratacache::Error>(())
/// ```
pub struct CacheBuilder<K, V, C = SystemClock> {
    timeout: Option<Duration>,
    capacity: usize,
    clock: C,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CacheBuilder<K, V> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            capacity: 0,
            clock: SystemClock,
            _types: PhantomData,
        }
    }
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> CacheBuilder<K, V, C>
where
    K: Eq + Hash,
    C: Clock,
{
    /// Refresh entries older than `timeout`.
    ///
    /// Must fit in `i64` milliseconds. Default: [`DEFAULT_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Compute each entry once and keep it until invalidated.
    ///
    /// New and invalidated keys are still computed on first lookup.
    pub fn never_expire(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Pre-allocate room for `capacity` keys.
    ///
    /// This is a sizing hint, not a bound.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Read time from `clock` instead of the system clock.
    pub fn clock<C2: Clock>(self, clock: C2) -> CacheBuilder<K, V, C2> {
        CacheBuilder {
            timeout: self.timeout,
            capacity: self.capacity,
            clock,
            _types: PhantomData,
        }
    }

    /// Build the cache.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` if the timeout does not fit in `i64`
    /// milliseconds.
    pub fn build(self) -> Result<Cache<K, V, C>> {
        let timeout_millis = match self.timeout {
            Some(timeout) => i64::try_from(timeout.as_millis()).map_err(|_| {
                Error::InvalidConfig(format!(
                    "timeout of {}ms does not fit in i64 milliseconds",
                    timeout.as_millis()
                ))
            })?,
            // Only never-populated cells count as expired
            None => i64::MAX,
        };

        debug!(timeout_millis, capacity = self.capacity, "building cache");
        Ok(Cache {
            cells: DashMap::with_capacity(self.capacity),
            timeout_millis,
            clock: self.clock,
        })
    }
}
