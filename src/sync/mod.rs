//! Context-local synchronization primitives.
//!
//! - [`Signal`]: a one-way latch tasks can await. Signal timers resolve
//!   through it and interruptible waits use it as their interruptor.

mod signal;

pub use signal::{Signal, Wait};
