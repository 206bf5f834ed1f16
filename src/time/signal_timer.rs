//! A timer that pulses a [`Signal`] when it fires.
//!
//! [`SignalTimer`] is the building block for task-level sleeping: it
//! schedules a one-shot timer and, when that fires, clears its handle and
//! pulses its signal. Anything awaiting [`SignalTimer::wait`] then resumes.
//!
//! Dropping a running `SignalTimer` cancels its timer, so a task abandoned
//! mid-sleep never leaves a callback behind.

use super::handler::{TimerCallback, TimerHandle, TimerHandler};
use crate::sync::{Signal, Wait};
use crate::types::Time;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

struct SignalState {
    handle: RefCell<Option<TimerHandle>>,
    signal: Signal,
}

impl TimerCallback for SignalState {
    fn on_timer(&self, now: Time) {
        // The token is released after this returns; the handle must not
        // outlive it.
        self.handle.borrow_mut().take();
        tracing::trace!(now = %now, "signal timer fired");
        self.signal.pulse();
    }
}

/// One-shot timer exposed as a pulsable signal.
///
/// # Example
///
/// ```
/// use localtimer::time::{SignalTimer, TimerHandler, VirtualClock};
/// use localtimer::types::Time;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let clock = Rc::new(VirtualClock::new());
/// let timers = TimerHandler::with_virtual_clock(clock.clone());
///
/// let timer = SignalTimer::started(&timers, Duration::from_millis(20));
/// assert!(timer.is_running());
/// assert!(!timer.is_pulsed());
///
/// clock.advance_to(Time::from_millis(20));
/// timers.on_alarm_fired();
/// assert!(timer.is_pulsed());
/// ```
pub struct SignalTimer {
    handler: TimerHandler,
    state: Rc<SignalState>,
}

impl fmt::Debug for SignalTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTimer")
            .field("scheduled", &self.state.handle.borrow().is_some())
            .field("pulsed", &self.state.signal.is_pulsed())
            .finish()
    }
}

impl SignalTimer {
    /// Creates an idle timer.
    #[must_use]
    pub fn new(handler: &TimerHandler) -> Self {
        Self {
            handler: handler.clone(),
            state: Rc::new(SignalState {
                handle: RefCell::new(None),
                signal: Signal::new(),
            }),
        }
    }

    /// Creates a timer and immediately starts it for `duration`.
    #[must_use]
    pub fn started(handler: &TimerHandler, duration: Duration) -> Self {
        let timer = Self::new(handler);
        timer.start(duration);
        timer
    }

    /// Starts the countdown. A zero duration pulses at once.
    ///
    /// # Panics
    ///
    /// Panics if the timer was already started or has already pulsed. A
    /// signal timer is single-use.
    pub fn start(&self, duration: Duration) {
        assert!(
            self.state.handle.borrow().is_none(),
            "signal timer started while already running"
        );
        assert!(
            !self.state.signal.is_pulsed(),
            "signal timer started after it already pulsed"
        );

        if duration.is_zero() {
            self.state.signal.pulse();
            return;
        }

        let callback: Rc<dyn TimerCallback> = self.state.clone();
        let handle = self.handler.schedule_once_after(duration, callback);
        *self.state.handle.borrow_mut() = Some(handle);
    }

    /// Cancels a scheduled countdown. Returns `true` if a timer was pending.
    ///
    /// The signal is left unpulsed.
    pub fn cancel(&self) -> bool {
        let pending = self.state.handle.borrow_mut().take();
        match pending {
            Some(handle) => {
                self.handler.cancel(handle);
                true
            }
            None => false,
        }
    }

    /// True once started, whether still counting down or already pulsed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.signal.is_pulsed() || self.state.handle.borrow().is_some()
    }

    /// True once the countdown has elapsed.
    #[must_use]
    pub fn is_pulsed(&self) -> bool {
        self.state.signal.is_pulsed()
    }

    /// The signal this timer pulses.
    #[must_use]
    pub fn signal(&self) -> &Signal {
        &self.state.signal
    }

    /// Waits for the countdown to elapse.
    pub fn wait(&self) -> Wait<'_> {
        self.state.signal.wait()
    }
}

impl Drop for SignalTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{drive_until, init_test_logging};
    use crate::time::VirtualClock;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn setup() -> (Rc<VirtualClock>, TimerHandler) {
        let clock = Rc::new(VirtualClock::new());
        let timers = TimerHandler::with_virtual_clock(clock.clone());
        (clock, timers)
    }

    #[test]
    fn pulses_after_duration() {
        init_test("pulses_after_duration");
        let (clock, timers) = setup();
        let timer = SignalTimer::new(&timers);
        crate::assert_with_log!(!timer.is_running(), "idle before start", false, timer.is_running());

        timer.start(Duration::from_millis(15));
        drive_until(&timers, &clock, Time::from_millis(14));
        crate::assert_with_log!(!timer.is_pulsed(), "not yet", false, timer.is_pulsed());

        drive_until(&timers, &clock, Time::from_millis(15));
        crate::assert_with_log!(timer.is_pulsed(), "pulsed at deadline", true, timer.is_pulsed());
        crate::assert_with_log!(timer.is_running(), "pulsed counts as running", true, timer.is_running());
        let canceled = timer.cancel();
        crate::assert_with_log!(!canceled, "nothing left to cancel", false, canceled);
        crate::assert_with_log!(timers.is_empty(), "token released", true, timers.is_empty());
        crate::test_complete!("pulses_after_duration");
    }

    #[test]
    fn zero_duration_pulses_immediately() {
        init_test("zero_duration_pulses_immediately");
        let (_clock, timers) = setup();
        let timer = SignalTimer::started(&timers, Duration::ZERO);
        crate::assert_with_log!(timer.is_pulsed(), "pulsed", true, timer.is_pulsed());
        crate::assert_with_log!(timers.is_empty(), "no token", true, timers.is_empty());
        crate::test_complete!("zero_duration_pulses_immediately");
    }

    #[test]
    fn cancel_stops_the_pulse() {
        init_test("cancel_stops_the_pulse");
        let (clock, timers) = setup();
        let timer = SignalTimer::started(&timers, Duration::from_millis(10));
        let canceled = timer.cancel();
        crate::assert_with_log!(canceled, "was pending", true, canceled);
        crate::assert_with_log!(!timer.is_running(), "stopped", false, timer.is_running());

        drive_until(&timers, &clock, Time::from_millis(50));
        crate::assert_with_log!(!timer.is_pulsed(), "never pulsed", false, timer.is_pulsed());
        crate::test_complete!("cancel_stops_the_pulse");
    }

    #[test]
    fn drop_cancels_pending_timer() {
        init_test("drop_cancels_pending_timer");
        let (_clock, timers) = setup();
        {
            let _timer = SignalTimer::started(&timers, Duration::from_millis(10));
            crate::assert_with_log!(timers.pending_count() == 1, "scheduled", 1, timers.pending_count());
        }
        crate::assert_with_log!(timers.is_empty(), "canceled on drop", true, timers.is_empty());
        crate::assert_with_log!(timers.alarm_deadline().is_none(), "alarm idle", None::<Time>, timers.alarm_deadline());
        crate::test_complete!("drop_cancels_pending_timer");
    }

    #[test]
    #[should_panic(expected = "already running")]
    fn double_start_panics() {
        let (_clock, timers) = setup();
        let timer = SignalTimer::started(&timers, Duration::from_millis(10));
        timer.start(Duration::from_millis(10));
    }

    #[test]
    #[should_panic(expected = "already pulsed")]
    fn restart_after_pulse_panics() {
        let (_clock, timers) = setup();
        let timer = SignalTimer::started(&timers, Duration::ZERO);
        timer.start(Duration::from_millis(10));
    }
}
