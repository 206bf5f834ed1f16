//! The one-shot alarm the timer handler multiplexes all of its timers onto.
//!
//! An [`AlarmProvider`] holds at most one armed deadline. Arming again
//! replaces the previous deadline. When the alarm goes off it delivers exactly
//! one notification and disarms itself; the event loop observes that through
//! [`AlarmProvider::take_fired`] and forwards it to
//! [`TimerHandler::on_alarm_fired`](super::TimerHandler::on_alarm_fired).

use crate::types::Time;
use std::fmt;
use std::time::Duration;

/// A single re-armable one-shot alarm.
pub trait AlarmProvider: fmt::Debug {
    /// Arms the alarm for `deadline`, superseding any earlier arm.
    fn schedule_oneshot(&mut self, deadline: Time);

    /// Disarms the alarm. A no-op when nothing is armed.
    fn unschedule_oneshot(&mut self);

    /// The deadline the alarm is currently armed for.
    fn armed_deadline(&self) -> Option<Time>;

    /// The instant at which the notification will actually be delivered.
    ///
    /// Providers that tend to fire early report an instant before
    /// [`armed_deadline`](Self::armed_deadline).
    fn wake_time(&self) -> Option<Time> {
        self.armed_deadline()
    }

    /// Consumes the notification if the alarm has gone off by `now`.
    ///
    /// Returns `true` at most once per arm.
    fn take_fired(&mut self, now: Time) -> bool;
}

/// The stock alarm provider.
///
/// `slack` models an imprecise platform timer: the notification is delivered
/// up to `slack` before the armed deadline. The handler compensates for that
/// by treating an early notification as if it arrived on time.
#[derive(Debug, Default, Clone)]
pub struct OneshotAlarm {
    deadline: Option<Time>,
    slack: Duration,
}

impl OneshotAlarm {
    /// An alarm that fires exactly at its deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deadline: None,
            slack: Duration::ZERO,
        }
    }

    /// An alarm that fires up to `slack` early.
    #[must_use]
    pub const fn with_slack(slack: Duration) -> Self {
        Self {
            deadline: None,
            slack,
        }
    }

    /// The configured early-fire slack.
    #[must_use]
    pub const fn slack(&self) -> Duration {
        self.slack
    }
}

impl AlarmProvider for OneshotAlarm {
    fn schedule_oneshot(&mut self, deadline: Time) {
        self.deadline = Some(deadline);
    }

    fn unschedule_oneshot(&mut self) {
        self.deadline = None;
    }

    fn armed_deadline(&self) -> Option<Time> {
        self.deadline
    }

    fn wake_time(&self) -> Option<Time> {
        self.deadline.map(|deadline| deadline - self.slack)
    }

    fn take_fired(&mut self, now: Time) -> bool {
        match self.wake_time() {
            Some(wake) if wake <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
