//! localtimer: execution-context-local timers backed by a single one-shot alarm.
//!
//! # Overview
//!
//! Cooperative tasks ask for one-shot or repeating wake-ups at future instants
//! of monotonic time. Each execution context owns one
//! [`TimerHandler`](time::TimerHandler) that keeps every pending timer in a
//! priority queue and arms exactly one alarm, for the soonest of them.
//!
//! # Core Guarantees
//!
//! - **One alarm**: the alarm is armed iff a timer is pending, for the soonest one
//! - **Self-service callbacks**: a callback may schedule or cancel any timer, itself included
//! - **No drift**: repeating timers re-arm from the clamped firing instant
//! - **No dangling handles**: handles are generation-checked and consumed by `cancel`
//! - **Deterministic testing**: a virtual clock makes timer tests exact and instant
//!
//! # Module Structure
//!
//! - [`types`]: the [`Time`](types::Time) instant
//! - [`time`]: clocks, the alarm seam, the timer queue and handler, signal
//!   timers, naps, repeating timers
//! - [`sync`]: the [`Signal`](sync::Signal) latch used for wake-ups and interruption
//! - [`runtime`]: a single-threaded executor that drives a handler
//! - [`combinator`]: exponential backoff
//! - [`config`]: runtime and backoff configuration
//! - [`error`]: error types
//! - [`util`]: the generational arena

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]

pub mod combinator;
pub mod config;
pub mod error;
pub mod runtime;
pub mod sync;
pub mod time;
pub mod types;
pub mod util;

#[doc(hidden)]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use combinator::ExponentialBackoff;
pub use config::{BackoffConfig, ClockKind, RuntimeConfig};
pub use error::{Canceled, ConfigError};
pub use runtime::{LocalRuntime, LocalRuntimeBuilder, LocalSpawner};
pub use sync::Signal;
pub use time::{
    nap, nap_interruptible, RepeatingTimer, SignalTimer, TimerCallback, TimerHandle, TimerHandler,
};
pub use types::Time;
