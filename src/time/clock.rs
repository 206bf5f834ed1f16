//! Monotonic time sources.
//!
//! The timer handler reads "now" through a [`TimeSource`], and the runtime's
//! event loop uses the same source to wait for the armed alarm. Two sources
//! are provided:
//!
//! - [`WallClock`]: `std::time::Instant` based, waits by sleeping the thread.
//! - [`VirtualClock`]: time moves only when told to; waiting jumps straight to
//!   the deadline, which makes timer tests deterministic and instant.

use crate::types::Time;
use std::cell::Cell;
use std::fmt;

/// A monotonic clock the timer handler can read and the event loop can wait on.
pub trait TimeSource: fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> Time;

    /// Blocks the calling thread until `deadline` has been reached.
    ///
    /// Returns immediately if the deadline is already in the past.
    fn park_until(&self, deadline: Time);
}

/// Production time source backed by [`std::time::Instant`].
///
/// The epoch is the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    epoch: std::time::Instant,
}

impl WallClock {
    /// Creates a wall clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        let elapsed = self.epoch.elapsed();
        Time::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    fn park_until(&self, deadline: Time) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Manually driven time source for tests.
///
/// # Example
///
/// ```
/// use localtimer::time::{TimeSource, VirtualClock};
/// use localtimer::types::Time;
///
/// let clock = VirtualClock::new();
/// assert_eq!(clock.now(), Time::ZERO);
///
/// clock.advance_to(Time::from_millis(30));
/// assert_eq!(clock.now(), Time::from_millis(30));
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<u64>,
}

impl VirtualClock {
    /// Creates a virtual clock at time zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { now: Cell::new(0) }
    }

    /// Creates a virtual clock at the given instant.
    #[must_use]
    pub const fn starting_at(time: Time) -> Self {
        Self {
            now: Cell::new(time.as_nanos()),
        }
    }

    /// Moves time forward by `nanos`.
    pub fn advance(&self, nanos: u64) {
        self.now.set(self.now.get().saturating_add(nanos));
    }

    /// Moves time forward to `time`; a no-op if `time` is in the past.
    pub fn advance_to(&self, time: Time) {
        if time.as_nanos() > self.now.get() {
            self.now.set(time.as_nanos());
        }
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.get())
    }

    fn park_until(&self, deadline: Time) {
        self.advance_to(deadline);
    }
}
