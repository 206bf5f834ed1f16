//! Test utilities for localtimer.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A driver that steps a handler over virtual time without a runtime
//!
//! # Example
//! ```
//! use localtimer::test_utils::{drive_until, init_test_logging};
//! use localtimer::time::{TimerHandler, VirtualClock};
//! use localtimer::types::Time;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! init_test_logging();
//! let clock = Rc::new(VirtualClock::new());
//! let timers = TimerHandler::with_virtual_clock(clock.clone());
//! let handle = timers.add_repeating(Duration::from_millis(10), Rc::new(|_now: Time| {}));
//! assert_eq!(drive_until(&timers, &clock, Time::from_millis(45)), 4);
//! timers.cancel(handle);
//! ```

use crate::time::{TimeSource, TimerHandler, VirtualClock};
use crate::types::Time;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Serializes tests that mutate `LOCALTIMER_*` environment variables.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Steps `timers` forward on `clock` up to `until`, delivering every alarm
/// whose wake time falls inside the window. Returns the number of callbacks
/// run. The clock ends at `until` (or later, if it was already past it).
pub fn drive_until(timers: &TimerHandler, clock: &VirtualClock, until: Time) -> usize {
    let mut fired = 0;
    while let Some(wake) = timers.alarm_wake_time() {
        if wake > until {
            break;
        }
        clock.advance_to(wake);
        if timers.take_alarm(clock.now()) {
            fired += timers.on_alarm_fired();
        }
    }
    clock.advance_to(until);
    tracing::trace!(until = %until, fired, "virtual time driven");
    fired
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
