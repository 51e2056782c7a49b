//! Unified error types for stratacache.
//!
//! Wraps the per-cell update failure together with the errors raised while
//! configuring a cache, so callers deal with a single error type.

use strata_cache_core::UpdateError;
use thiserror::Error;

/// All stratacache errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The updater run by this call failed; the cached entry is unchanged
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Cache configuration rejected by the builder
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for stratacache operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Update failures never modify the cache, so calling again retries from
    /// the same state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Update(_))
    }

    /// Borrow the update failure, if this is one
    pub fn as_update(&self) -> Option<&UpdateError> {
        match self {
            Error::Update(e) => Some(e),
            Error::InvalidConfig(_) => None,
        }
    }
}
