//! The single-threaded local runtime.
//!
//! - [`builder`]: [`LocalRuntimeBuilder`] and the [`LocalRuntime`] event loop
//! - `executor`: task storage and polling; [`LocalSpawner`]
//! - `waker`: `Send + Sync` wakers feeding a lock-free ready queue
//!
//! A runtime owns exactly one [`TimerHandler`](crate::time::TimerHandler) and
//! plays the alarm provider's notification path: whenever no task is runnable
//! it parks on the clock until the alarm's wake time and then calls
//! [`TimerHandler::on_alarm_fired`](crate::time::TimerHandler::on_alarm_fired).
//!
//! ## Quick Start
//!
//! ```
//! use localtimer::runtime::LocalRuntimeBuilder;
//! use std::time::Duration;
//!
//! let runtime = LocalRuntimeBuilder::new().virtual_clock().build().unwrap();
//! let timers = runtime.timers();
//! runtime.block_on(async move {
//!     timers.sleep(Duration::from_millis(5)).await;
//! });
//! ```

pub mod builder;
mod executor;
mod waker;

pub use builder::{LocalRuntime, LocalRuntimeBuilder};
pub use executor::LocalSpawner;
