//! Periodic timers that ring a task.
//!
//! A [`RepeatingTimer`] wraps a repeating handler token. Each time it fires it
//! records the ring instant and hands the ring to the runtime with
//! [`LocalSpawner::spawn_now`], so the ring body starts executing before the
//! timer callback returns. The interval can be changed, or the next ring pulled
//! in, while the timer is running.
//!
//! Rings are scheduled from the clamped firing instant, so a timer created at
//! `t0` with interval `I` rings at `t0 + I`, `t0 + 2I`, ... without drift.

use super::handler::{TimerCallback, TimerHandle, TimerHandler};
use crate::runtime::LocalSpawner;
use crate::types::Time;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

type RingFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Plain callback interface for a ring that does not need to suspend.
pub trait RingCallback {
    /// Called on every ring.
    fn on_ring(&self);
}

enum Ringer {
    Task {
        spawner: LocalSpawner,
        make: Box<dyn Fn() -> RingFuture>,
        /// Spawned rings that have not finished.
        in_flight: Rc<Cell<u32>>,
    },
    Callback(Rc<dyn RingCallback>),
}

struct RepeatingState {
    handler: TimerHandler,
    ringer: Ringer,
    interval: Cell<Duration>,
    last_time: Cell<Time>,
    expected_next: Cell<Time>,
    rings: Cell<u64>,
    handle: RefCell<Option<TimerHandle>>,
}

impl RepeatingState {
    /// Drops the current token and schedules a fresh one.
    fn reschedule(self: &Rc<Self>, at: Time, interval: Duration) {
        let previous = self.handle.borrow_mut().take();
        if let Some(handle) = previous {
            self.handler.cancel(handle);
        }
        let callback: Rc<dyn TimerCallback> = self.clone();
        let handle = self.handler.schedule_repeating(at, interval, callback);
        *self.handle.borrow_mut() = Some(handle);
    }
}

impl TimerCallback for RepeatingState {
    fn on_timer(&self, now: Time) {
        self.last_time.set(now);
        self.expected_next.set(now + self.interval.get());
        self.rings.set(self.rings.get() + 1);

        match &self.ringer {
            Ringer::Task {
                spawner,
                make,
                in_flight,
            } => {
                if in_flight.get() > 0 {
                    tracing::warn!(
                        running = in_flight.get(),
                        now = %now,
                        interval_ms = self.interval.get().as_millis(),
                        "repeating timer rang while its previous ring is still running"
                    );
                }
                in_flight.set(in_flight.get() + 1);
                let ring = make();
                let done = Rc::clone(in_flight);
                spawner.spawn_now(async move {
                    ring.await;
                    done.set(done.get() - 1);
                });
            }
            Ringer::Callback(callback) => callback.on_ring(),
        }
    }
}

/// A timer that rings every `interval` until dropped.
///
/// # Example
///
/// ```
/// use localtimer::runtime::LocalRuntimeBuilder;
/// use localtimer::time::RepeatingTimer;
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let runtime = LocalRuntimeBuilder::new().virtual_clock().build().unwrap();
/// let timers = runtime.timers();
/// let rings = Rc::new(Cell::new(0));
///
/// let counter = rings.clone();
/// let ticker = RepeatingTimer::new(&timers, &runtime.spawner(), Duration::from_millis(10), move || {
///     let counter = counter.clone();
///     async move { counter.set(counter.get() + 1) }
/// });
///
/// runtime.block_on(timers.sleep(Duration::from_millis(35)));
/// assert_eq!(rings.get(), 3);
/// drop(ticker);
/// ```
pub struct RepeatingTimer {
    state: Rc<RepeatingState>,
}

impl fmt::Debug for RepeatingTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatingTimer")
            .field("interval", &self.state.interval.get())
            .field("last_time", &self.state.last_time.get())
            .field("expected_next", &self.state.expected_next.get())
            .field("rings", &self.state.rings.get())
            .finish()
    }
}

impl RepeatingTimer {
    /// Starts a timer whose first ring is one `interval` from now. Each ring
    /// spawns the future returned by `ring` on `spawner`.
    ///
    /// Keeping a ring shorter than the interval is the caller's job. The timer
    /// never waits for a ring to finish: a ring still running when the next
    /// one is due is logged at `warn` and the next ring starts alongside it.
    /// [`rings_in_flight`](Self::rings_in_flight) exposes the condition.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new<R, Fut>(
        handler: &TimerHandler,
        spawner: &LocalSpawner,
        interval: Duration,
        ring: R,
    ) -> Self
    where
        R: Fn() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let make: Box<dyn Fn() -> RingFuture> = Box::new(move || Box::pin(ring()));
        Self::start(
            handler,
            interval,
            Ringer::Task {
                spawner: spawner.clone(),
                make,
                in_flight: Rc::new(Cell::new(0)),
            },
        )
    }

    /// Starts a timer that calls `callback.on_ring()` synchronously on every
    /// ring.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn from_callback(
        handler: &TimerHandler,
        interval: Duration,
        callback: Rc<dyn RingCallback>,
    ) -> Self {
        Self::start(handler, interval, Ringer::Callback(callback))
    }

    fn start(handler: &TimerHandler, interval: Duration, ringer: Ringer) -> Self {
        assert!(!interval.is_zero(), "repeating timer interval must be positive");
        let now = handler.now();
        let state = Rc::new(RepeatingState {
            handler: handler.clone(),
            ringer,
            interval: Cell::new(interval),
            last_time: Cell::new(now),
            expected_next: Cell::new(now + interval),
            rings: Cell::new(0),
            handle: RefCell::new(None),
        });
        state.reschedule(now + interval, interval);
        Self { state }
    }

    /// Switches to a new interval.
    ///
    /// The next ring moves to `last_time + interval` if that is sooner than
    /// the ring already expected, and stays put otherwise.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn change_interval(&self, interval: Duration) {
        assert!(!interval.is_zero(), "repeating timer interval must be positive");
        if interval == self.state.interval.get() {
            return;
        }
        self.state.interval.set(interval);
        let next = (self.state.last_time.get() + interval).min(self.state.expected_next.get());
        self.state.expected_next.set(next);
        tracing::trace!(
            interval_ms = interval.as_millis(),
            next = %next,
            "repeating timer interval changed"
        );
        self.state.reschedule(next, interval);
    }

    /// Pulls the next ring in to at most `delay` after the last ring. Never
    /// pushes it later.
    pub fn clamp_next_ring(&self, delay: Duration) {
        let candidate = self.state.last_time.get() + delay;
        if candidate < self.state.expected_next.get() {
            self.state.expected_next.set(candidate);
            self.state.reschedule(candidate, self.state.interval.get());
        }
    }

    /// The current ring interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.state.interval.get()
    }

    /// When the next ring is due.
    #[must_use]
    pub fn expected_next(&self) -> Time {
        self.state.expected_next.get()
    }

    /// When the timer last rang (its creation time before the first ring).
    #[must_use]
    pub fn last_time(&self) -> Time {
        self.state.last_time.get()
    }

    /// Spawned rings that have not finished yet. Always zero for callback
    /// timers.
    #[must_use]
    pub fn rings_in_flight(&self) -> u32 {
        match &self.state.ringer {
            Ringer::Task { in_flight, .. } => in_flight.get(),
            Ringer::Callback(_) => 0,
        }
    }

    /// How many times the timer has rung.
    #[must_use]
    pub fn ring_count(&self) -> u64 {
        self.state.rings.get()
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        let handle = self.state.handle.borrow_mut().take();
        if let Some(handle) = handle {
            self.state.handler.cancel(handle);
        }
    }
}
