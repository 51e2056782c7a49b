//! Core types for strata-cache
//!
//! This crate defines the pieces shared by every cache layer:
//! - UpdateError: the failure raised by a cell whose updater failed
//! - Clock: the millisecond time source cells compare timestamps against

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock, NEVER_SET};
pub use error::{BoxError, UpdateError};
