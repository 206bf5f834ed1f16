//! Core value types.
//!
//! - [`time`]: the monotonic [`Time`] instant used by every timer API

pub mod time;

pub use time::Time;
