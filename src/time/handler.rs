//! The per-context timer handler.
//!
//! [`TimerHandler`] multiplexes any number of application timers onto one
//! [`AlarmProvider`]. It owns the [`TimerQueue`], keeps the alarm armed for
//! the soonest pending token, and runs the firing protocol when the alarm
//! goes off.
//!
//! # Firing protocol
//!
//! [`on_alarm_fired`](TimerHandler::on_alarm_fired):
//!
//! 1. Reads the clock and clamps it up to the instant the alarm was armed
//!    for, so an alarm that fires a touch early still processes the tokens it
//!    was armed for instead of re-arming over and over for the same deadline.
//! 2. Drains every due token in fire order. A repeating token is requeued at
//!    `now + interval` *before* its callback runs, so the callback can cancel
//!    it (or observe its next occurrence). The callback runs with no internal
//!    borrow held and may schedule or cancel any timer. A one-shot token is
//!    released once its callback returns.
//! 3. Re-arms the alarm for the new soonest token, if any.
//!
//! # Ownership
//!
//! The queue owns every token. A [`TimerHandle`] is a non-owning, non-`Clone`
//! capability that [`cancel`](TimerHandler::cancel) consumes. Handles carry
//! the token's arena generation, so canceling a one-shot that already fired
//! (or canceling twice through a forged index) is detected and panics instead
//! of touching an unrelated timer.
//!
//! # Context locality
//!
//! A handler belongs to one thread. It is `Rc`-shared and `!Send`; cloning a
//! `TimerHandler` clones the handle, not the queue.

use super::alarm::{AlarmProvider, OneshotAlarm};
use super::clock::{TimeSource, VirtualClock};
use super::queue::{TimerQueue, TimerToken};
use crate::error::Canceled;
use crate::sync::Signal;
use crate::types::Time;
use crate::util::ArenaIndex;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// The capability a timer invokes when it fires.
///
/// `now` is the (drift-compensated) instant of the firing pass; the same value
/// is passed to every callback in that pass, so it may lag real time if an
/// earlier callback was slow.
pub trait TimerCallback {
    /// Called on the handler's thread each time the timer fires.
    fn on_timer(&self, now: Time);
}

impl<F> TimerCallback for F
where
    F: Fn(Time),
{
    fn on_timer(&self, now: Time) {
        self(now);
    }
}

/// Cancellation capability for one scheduled timer.
///
/// Valid while the timer is pending or firing. A one-shot timer's handle
/// becomes invalid once its callback returns; a repeating timer's handle stays
/// valid until canceled.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a timer handle is the only way to cancel its timer"]
pub struct TimerHandle(ArenaIndex);

impl TimerHandle {
    /// The arena slot and generation backing this handle.
    #[must_use]
    pub const fn id(&self) -> ArenaIndex {
        self.0
    }
}

/// Counters describing a handler's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// Timers scheduled.
    pub scheduled: u64,
    /// Timers canceled.
    pub canceled: u64,
    /// Callback invocations.
    pub fired: u64,
    /// Alarm notifications processed.
    pub alarms: u64,
    /// Times the alarm was armed for a new deadline.
    pub arms: u64,
    /// Times the alarm was explicitly disarmed.
    pub disarms: u64,
}

struct HandlerCore {
    queue: TimerQueue,
    alarm: Box<dyn AlarmProvider>,
    /// The deadline the alarm was last armed for. Early notifications are
    /// treated as if they arrived at this instant.
    expected_oneshot_time: Time,
    stats: HandlerStats,
}

impl HandlerCore {
    /// Arms the alarm for the soonest token, or disarms it if none is pending.
    fn sync_alarm(&mut self) {
        match self.queue.peek().map(TimerToken::next_fire) {
            Some(next) => {
                if self.alarm.armed_deadline() != Some(next) {
                    tracing::trace!(deadline = %next, "arming alarm");
                    self.alarm.schedule_oneshot(next);
                    self.expected_oneshot_time = next;
                    self.stats.arms += 1;
                }
            }
            None => {
                if self.alarm.armed_deadline().is_some() {
                    tracing::trace!("disarming alarm");
                    self.alarm.unschedule_oneshot();
                    self.stats.disarms += 1;
                }
            }
        }
    }
}

impl Drop for HandlerCore {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let owned = self.queue.owned();
        assert!(
            owned == 0,
            "timer handler dropped with {owned} timer(s) still scheduled"
        );
    }
}

/// Owns the timer queue and the alarm for one execution context.
///
/// # Example
///
/// ```
/// use localtimer::time::{TimerHandler, VirtualClock};
/// use localtimer::types::Time;
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let clock = Rc::new(VirtualClock::new());
/// let timers = TimerHandler::with_virtual_clock(clock.clone());
///
/// let fired = Rc::new(Cell::new(false));
/// let flag = fired.clone();
/// let _handle = timers.schedule_once_after(
///     Duration::from_millis(10),
///     Rc::new(move |_now: Time| flag.set(true)),
/// );
/// assert_eq!(timers.alarm_deadline(), Some(Time::from_millis(10)));
///
/// clock.advance_to(Time::from_millis(10));
/// timers.on_alarm_fired();
/// assert!(fired.get());
/// assert!(timers.is_empty());
/// ```
#[derive(Clone)]
pub struct TimerHandler {
    core: Rc<RefCell<HandlerCore>>,
    clock: Rc<dyn TimeSource>,
}

impl fmt::Debug for TimerHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("TimerHandler")
            .field("pending", &core.queue.len())
            .field("alarm", &core.alarm)
            .field("expected_oneshot_time", &core.expected_oneshot_time)
            .finish_non_exhaustive()
    }
}

impl TimerHandler {
    /// Creates a handler reading `clock` and driving `alarm`.
    #[must_use]
    pub fn new(clock: Rc<dyn TimeSource>, alarm: Box<dyn AlarmProvider>) -> Self {
        Self {
            core: Rc::new(RefCell::new(HandlerCore {
                queue: TimerQueue::new(),
                alarm,
                expected_oneshot_time: Time::ZERO,
                stats: HandlerStats::default(),
            })),
            clock,
        }
    }

    /// Creates a handler over a virtual clock and an exact alarm.
    #[must_use]
    pub fn with_virtual_clock(clock: Rc<VirtualClock>) -> Self {
        Self::new(clock, Box::new(OneshotAlarm::new()))
    }

    /// The current instant on this handler's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// The clock this handler reads.
    #[must_use]
    pub fn clock(&self) -> &Rc<dyn TimeSource> {
        &self.clock
    }

    /// Schedules `callback` to fire at `next_fire`, then every `interval` if
    /// `interval` is non-zero.
    ///
    /// A `next_fire` that is already in the past fires on the next alarm pass.
    pub fn schedule(
        &self,
        next_fire: Time,
        interval: Duration,
        callback: Rc<dyn TimerCallback>,
    ) -> TimerHandle {
        let mut core = self.core.borrow_mut();
        let idx = core
            .queue
            .push(TimerToken::new(next_fire, interval, callback));
        core.stats.scheduled += 1;
        tracing::trace!(
            timer = ?idx,
            deadline = %next_fire,
            interval_ms = interval.as_millis(),
            "timer scheduled"
        );
        core.sync_alarm();
        TimerHandle(idx)
    }

    /// Cancels a pending timer. After this returns the callback will not run
    /// again.
    ///
    /// # Panics
    ///
    /// Panics if the handle is no longer live (its one-shot timer already
    /// fired, or it belongs to a different handler).
    pub fn cancel(&self, handle: TimerHandle) {
        let mut core = self.core.borrow_mut();
        let removed = core.queue.remove(handle.0);
        assert!(
            removed.is_some(),
            "cancel of timer {:?} which is no longer scheduled",
            handle.0
        );
        core.stats.canceled += 1;
        tracing::trace!(timer = ?handle.0, "timer canceled");
        core.sync_alarm();
        drop(core);
        // The token, and with it the callback, is dropped outside the borrow:
        // the callback's destructor may itself talk to this handler.
        drop(removed);
    }

    /// True while `handle`'s timer is pending or firing.
    #[must_use]
    pub fn is_live(&self, handle: &TimerHandle) -> bool {
        self.core.borrow().queue.contains(handle.0)
    }

    /// Processes an alarm notification. Returns the number of callbacks run.
    ///
    /// Called by the event loop when the alarm provider reports that it went
    /// off; ordinary callers never need it.
    pub fn on_alarm_fired(&self) -> usize {
        let now = {
            let mut core = self.core.borrow_mut();
            core.stats.alarms += 1;
            self.clock.now().max(core.expected_oneshot_time)
        };

        let mut fired = 0;
        loop {
            let (idx, callback, repeating) = {
                let mut core = self.core.borrow_mut();
                let Some(idx) = core.queue.pop_due(now) else {
                    break;
                };
                let Some(token) = core.queue.get(idx) else {
                    break;
                };
                let interval = token.interval();
                let callback = Rc::clone(token.callback());
                if !interval.is_zero() {
                    core.queue.requeue(idx, now + interval);
                }
                core.stats.fired += 1;
                (idx, callback, !interval.is_zero())
            };

            callback.on_timer(now);
            fired += 1;

            if !repeating {
                let released = self.core.borrow_mut().queue.release(idx);
                drop(released);
            }
        }

        self.core.borrow_mut().sync_alarm();
        tracing::debug!(now = %now, fired, "alarm processed");
        fired
    }

    /// Consumes the alarm's notification if it has gone off by `now`.
    ///
    /// Used by the event loop together with
    /// [`on_alarm_fired`](Self::on_alarm_fired).
    pub fn take_alarm(&self, now: Time) -> bool {
        self.core.borrow_mut().alarm.take_fired(now)
    }

    /// Schedules a repeating timer whose first ring is at `start`.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn schedule_repeating(
        &self,
        start: Time,
        interval: Duration,
        callback: Rc<dyn TimerCallback>,
    ) -> TimerHandle {
        assert!(!interval.is_zero(), "repeating timer interval must be positive");
        self.schedule(start, interval, callback)
    }

    /// Schedules a repeating timer whose first ring is one `interval` from now.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn add_repeating(&self, interval: Duration, callback: Rc<dyn TimerCallback>) -> TimerHandle {
        self.schedule_repeating(self.now() + interval, interval, callback)
    }

    /// Schedules a one-shot timer `delay` from now.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is zero; use [`fire_once_after`](Self::fire_once_after)
    /// for "as soon as possible".
    pub fn schedule_once_after(
        &self,
        delay: Duration,
        callback: Rc<dyn TimerCallback>,
    ) -> TimerHandle {
        assert!(!delay.is_zero(), "one-shot delay must be positive");
        self.fire_once_after(delay, callback)
    }

    /// Schedules a one-shot timer `delay` from now; zero means the next alarm
    /// pass.
    pub fn fire_once_after(&self, delay: Duration, callback: Rc<dyn TimerCallback>) -> TimerHandle {
        self.schedule(self.now() + delay, Duration::ZERO, callback)
    }

    /// Suspends the calling task for `duration`.
    pub async fn sleep(&self, duration: Duration) {
        super::nap::nap(self, duration).await;
    }

    /// Suspends the calling task for `duration`, or until `interruptor` is
    /// pulsed.
    pub async fn sleep_interruptible(
        &self,
        duration: Duration,
        interruptor: &Signal,
    ) -> Result<(), Canceled> {
        super::nap::nap_interruptible(self, duration, interruptor).await
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.core.borrow().queue.len()
    }

    /// True when no timer is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.borrow().queue.is_empty()
    }

    /// When the soonest pending timer fires.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Time> {
        self.core.borrow().queue.peek().map(TimerToken::next_fire)
    }

    /// The deadline the alarm is armed for.
    #[must_use]
    pub fn alarm_deadline(&self) -> Option<Time> {
        self.core.borrow().alarm.armed_deadline()
    }

    /// When the alarm's notification will actually be delivered.
    #[must_use]
    pub fn alarm_wake_time(&self) -> Option<Time> {
        self.core.borrow().alarm.wake_time()
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> HandlerStats {
        self.core.borrow().stats
    }
}
