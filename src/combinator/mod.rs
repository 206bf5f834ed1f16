//! Retry combinators built on the timer handler.
//!
//! - [`backoff`]: exponential backoff between retries of a failing operation

pub mod backoff;

pub use backoff::{ExponentialBackoff, DEFAULT_GROWTH_FACTOR, DEFAULT_SHRINK_FACTOR};
