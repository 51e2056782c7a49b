//! Error types for cache updates
//!
//! A cell surfaces exactly one kind of failure: the updater it ran failed.
//! The failure is raised only in the thread that ran the updater, and the
//! original cause is kept so callers can inspect it directly.

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed updater failure
///
/// Anything that converts into this type can be returned by an updater:
/// concrete error types, `anyhow::Error`, `String` and `&str`.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Updater failure raised by a cache cell
///
/// Carries the updater's original error as its source. The cell that raised
/// it is left exactly as it was before the failed attempt, so the error is
/// always retryable.
#[derive(Debug, Error)]
#[error("cache value update failed: {cause}")]
pub struct UpdateError {
    #[source]
    cause: BoxError,
}

impl UpdateError {
    /// Wrap an updater failure
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    /// The updater's original error
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    /// Check whether the original error is of type `T`
    pub fn is<T: StdError + 'static>(&self) -> bool {
        self.cause.is::<T>()
    }

    /// Borrow the original error as `T`, if it is one
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.cause.downcast_ref::<T>()
    }

    /// Unwrap into the original error
    pub fn into_cause(self) -> BoxError {
        self.cause
    }
}
