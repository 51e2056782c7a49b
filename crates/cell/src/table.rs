//! Key -> cell lookup
//!
//! A cache is a concurrent map from key to `Arc<CacheCell>`. The map is owned
//! by the caller and handed to the helpers here explicitly; this crate never
//! keeps one of its own.
//!
//! On a miss the helpers insert an empty placeholder cell before any value
//! exists. Callers racing on the first access to a key therefore all end up
//! on the same cell, and the cell's own update protocol lets only one of
//! them run the updater.
//!
//! No map guard is held while a cell is updating: the cell is cloned out of
//! the map first, so slow updaters never block other keys.

use crate::cell::CacheCell;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use strata_cache_core::{BoxError, Clock, SystemClock, UpdateError};
use tracing::debug;

/// Concurrent map of cache cells
///
/// Implementations must make `get_or_insert_with` atomic: when several
/// callers insert the same absent key at once, exactly one cell wins and
/// every caller gets that one back.
pub trait CacheTable<K, V, C = SystemClock> {
    /// Look up the cell for `key`
    fn get_cell(&self, key: &K) -> Option<Arc<CacheCell<V, C>>>;

    /// Return the cell for `key`, inserting `make_cell()` if there is none
    ///
    /// `make_cell` may be called even when another caller wins the insert;
    /// the losing cell is dropped.
    fn get_or_insert_with<F>(&self, key: K, make_cell: F) -> Arc<CacheCell<V, C>>
    where
        F: FnOnce() -> CacheCell<V, C>;
}

impl<K, V, C, S> CacheTable<K, V, C> for DashMap<K, Arc<CacheCell<V, C>>, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    fn get_cell(&self, key: &K) -> Option<Arc<CacheCell<V, C>>> {
        self.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn get_or_insert_with<F>(&self, key: K, make_cell: F) -> Arc<CacheCell<V, C>>
    where
        F: FnOnce() -> CacheCell<V, C>,
    {
        // The entry guard locks the key's shard, so construction and insert
        // happen as one step
        let entry = self.entry(key).or_insert_with(|| Arc::new(make_cell()));
        Arc::clone(entry.value())
    }
}

impl<K, V, C, S> CacheTable<K, V, C> for RwLock<HashMap<K, Arc<CacheCell<V, C>>, S>>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn get_cell(&self, key: &K) -> Option<Arc<CacheCell<V, C>>> {
        self.read().get(key).cloned()
    }

    fn get_or_insert_with<F>(&self, key: K, make_cell: F) -> Arc<CacheCell<V, C>>
    where
        F: FnOnce() -> CacheCell<V, C>,
    {
        if let Some(cell) = self.read().get(&key) {
            return Arc::clone(cell);
        }
        // Re-checked under the write lock by `entry`
        let mut map = self.write();
        Arc::clone(map.entry(key).or_insert_with(|| Arc::new(make_cell())))
    }
}

/// Get the value for `key`, computing it with `updater` when missing or
/// older than `timeout_millis`
///
/// Inserts an empty `CacheCell::new()` for a key seen for the first time.
/// See [`CacheCell::get_or_update`] for the meaning of the timeout and the
/// returned value.
pub fn get_or_update<T, K, V, F, E>(
    table: &T,
    key: &K,
    timeout_millis: i64,
    updater: F,
) -> Result<Option<Arc<V>>, UpdateError>
where
    T: CacheTable<K, V> + ?Sized,
    K: Clone,
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
{
    get_or_update_with(table, key, timeout_millis, updater, CacheCell::new)
}

/// Like [`get_or_update`], building placeholder cells with `make_cell`
///
/// Use this to choose the cell's clock, or to seed new keys with something
/// other than an empty cell.
pub fn get_or_update_with<T, K, V, C, F, E, M>(
    table: &T,
    key: &K,
    timeout_millis: i64,
    updater: F,
    make_cell: M,
) -> Result<Option<Arc<V>>, UpdateError>
where
    T: CacheTable<K, V, C> + ?Sized,
    K: Clone,
    C: Clock,
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
    M: FnOnce() -> CacheCell<V, C>,
{
    let cell = match table.get_cell(key) {
        Some(cell) => cell,
        None => {
            let mut inserted = false;
            let cell = table.get_or_insert_with(key.clone(), || {
                inserted = true;
                make_cell()
            });
            if inserted {
                debug!("inserted placeholder cache cell");
            }
            cell
        }
    };

    cell.get_or_update(timeout_millis, updater)
}
