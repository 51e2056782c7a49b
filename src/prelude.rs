//! Convenient imports for stratacache.
//!
//! ```
//! use stratacache::prelude::*;
//!
//! let cache: Cache<u32, String> = Cache::builder().never_expire().build()?;
//! # Ok::<(), stratacache::Error>(())
//! ```

// Main entry point
pub use crate::cache::{Cache, CacheBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Cell layer
pub use strata_cache_cell::{CacheCell, CacheTable};

// Time
pub use strata_cache_core::{Clock, SystemClock};
