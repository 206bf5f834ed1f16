//! Timers multiplexed onto a single one-shot alarm.
//!
//! Layering, leaves first:
//!
//! - [`clock`]: [`TimeSource`] with [`WallClock`] and [`VirtualClock`]
//! - [`alarm`]: the [`AlarmProvider`] seam and the stock [`OneshotAlarm`]
//! - [`queue`]: [`TimerQueue`], an indexed min-heap of [`TimerToken`]s
//! - [`handler`]: [`TimerHandler`], the per-context owner of queue and alarm
//! - [`signal_timer`]: [`SignalTimer`], a one-shot timer that pulses a signal
//! - [`nap`](mod@nap): task-level sleeping on top of signal timers
//! - [`repeating`]: [`RepeatingTimer`], periodic rings handed to the runtime
//!
//! # Virtual vs Wall Time
//!
//! Every component reads time through the handler's [`TimeSource`]. Under a
//! [`VirtualClock`] time only moves when the event loop parks, which makes
//! timer behavior exact and instant in tests.
//!
//! # Example
//!
//! ```
//! use localtimer::runtime::LocalRuntimeBuilder;
//! use localtimer::time::nap;
//! use std::time::Duration;
//!
//! let runtime = LocalRuntimeBuilder::new().virtual_clock().build().unwrap();
//! let timers = runtime.timers();
//! runtime.block_on(async {
//!     nap(&timers, Duration::from_millis(100)).await;
//! });
//! assert_eq!(timers.now().as_millis(), 100);
//! ```

pub mod alarm;
pub mod clock;
pub mod handler;
pub mod nap;
pub mod queue;
pub mod repeating;
pub mod signal_timer;

pub use alarm::{AlarmProvider, OneshotAlarm};
pub use clock::{TimeSource, VirtualClock, WallClock};
pub use handler::{HandlerStats, TimerCallback, TimerHandle, TimerHandler};
pub use nap::{nap, nap_interruptible};
pub use queue::{TimerQueue, TimerToken};
pub use repeating::{RepeatingTimer, RingCallback};
pub use signal_timer::SignalTimer;
