//! # stratacache
//!
//! Stampede-free, time-expiring in-process cache.
//!
//! Every key owns a [`CacheCell`]: a value stamped with the time it was
//! computed and guarded by an update lock that is only taken once the value
//! is older than the caller's timeout. However many threads find a key
//! missing or expired at the same moment, one of them runs the updater and
//! the rest reuse its result.
//!
//! ## Quick Start
//!
//! ```
//! use stratacache::prelude::*;
//!
//! let cache: Cache<String, String> = Cache::new();
//!
//! let profile = cache.get(&"user:1".to_string(), || {
//!     // Expensive lookup, run at most once per expiry window
//!     Ok::<_, std::io::Error>("Alice".to_string())
//! })?;
//! assert_eq!(profile.as_deref().map(String::as_str), Some("Alice"));
//! # Ok::<(), stratacache::Error>(())
//! ```
//!
//! ## Layers
//!
//! - [`Cache`] - keyed cache owning its cells, configured with [`CacheBuilder`]
//! - [`CacheCell`] - the single-entry primitive, usable on its own
//! - [`CacheTable`] / [`get_or_update`] - plug cells into a map you own

#![warn(missing_docs)]

mod cache;
mod error;

pub mod prelude;

// Re-export main entry points
pub use cache::{Cache, CacheBuilder, CacheStats, DEFAULT_TIMEOUT};
pub use error::{Error, Result};

// Re-export the cell layer
pub use strata_cache_cell::{
    get_or_update, get_or_update_with, CacheCell, CacheTable, CellStats, CellStatsSnapshot,
};

// Re-export core types
pub use strata_cache_core::{BoxError, Clock, ManualClock, SystemClock, UpdateError, NEVER_SET};
