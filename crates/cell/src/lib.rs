//! Stampede-free cache cells
//!
//! This crate implements the per-key synchronization primitive of the cache:
//! - CacheCell: a lazily populated, time-expiring value holder that lets only
//!   one caller recompute an expired value
//! - CellStats: counters describing how callers went through a cell
//! - CacheTable: the concurrent key -> cell mapping a cell lives in, plus the
//!   lookup helper that inserts placeholder cells on first access

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod stats;
pub mod table;

pub use cell::CacheCell;
pub use stats::{CellStats, CellStatsSnapshot};
pub use table::{get_or_update, get_or_update_with, CacheTable};

// Re-export the core types cell callers need
pub use strata_cache_core::{BoxError, Clock, ManualClock, SystemClock, UpdateError, NEVER_SET};
