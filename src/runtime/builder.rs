//! Runtime builder and the event loop.

use super::executor::{Executor, LocalSpawner};
use crate::config::{apply_env_overrides, ClockKind, RuntimeConfig};
use crate::error::ConfigError;
use crate::time::{OneshotAlarm, TimeSource, TimerHandler, VirtualClock, WallClock};
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Builder for constructing a [`LocalRuntime`] with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct LocalRuntimeBuilder {
    config: RuntimeConfig,
}

impl LocalRuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Create a builder seeded from the `LOCALTIMER_*` environment variables.
    ///
    /// Builder methods called afterwards take precedence.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config)?;
        Ok(Self { config })
    }

    /// Select the time source.
    #[must_use]
    pub fn clock(mut self, clock: ClockKind) -> Self {
        self.config.clock = clock;
        self
    }

    /// Run on virtual time.
    #[must_use]
    pub fn virtual_clock(self) -> Self {
        self.clock(ClockKind::Virtual)
    }

    /// Run on real monotonic time.
    #[must_use]
    pub fn wall_clock(self) -> Self {
        self.clock(ClockKind::Wall)
    }

    /// Let the alarm fire up to `slack` before its deadline.
    #[must_use]
    pub fn alarm_slack(mut self, slack: Duration) -> Self {
        self.config.alarm_slack = slack;
        self
    }

    /// Set the number of task polls per event-loop turn.
    #[must_use]
    pub fn poll_budget(mut self, budget: u32) -> Self {
        self.config.poll_budget = budget;
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a runtime from this configuration.
    pub fn build(self) -> Result<LocalRuntime, ConfigError> {
        LocalRuntime::with_config(self.config)
    }
}

/// A single-threaded executor that owns one [`TimerHandler`].
///
/// The event loop polls the root future and any spawned tasks. When nothing is
/// runnable it parks on the clock until the alarm's wake time, then delivers
/// the alarm notification to the handler.
///
/// # Example
///
/// ```
/// use localtimer::runtime::LocalRuntimeBuilder;
/// use localtimer::types::Time;
/// use std::time::Duration;
///
/// let runtime = LocalRuntimeBuilder::new().virtual_clock().build().unwrap();
/// let timers = runtime.timers();
/// let woke = runtime.block_on(async move {
///     timers.sleep(Duration::from_millis(40)).await;
///     timers.now()
/// });
/// assert_eq!(woke, Time::from_millis(40));
/// ```
pub struct LocalRuntime {
    config: RuntimeConfig,
    clock: Rc<dyn TimeSource>,
    timers: TimerHandler,
    executor: Rc<Executor>,
    running: Cell<bool>,
}

impl fmt::Debug for LocalRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("config", &self.config)
            .field("timers", &self.timers)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl LocalRuntime {
    /// Construct a runtime from the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock: Rc<dyn TimeSource> = match config.clock {
            ClockKind::Wall => Rc::new(WallClock::new()),
            ClockKind::Virtual => Rc::new(VirtualClock::new()),
        };
        let alarm = Box::new(OneshotAlarm::with_slack(config.alarm_slack));
        let timers = TimerHandler::new(Rc::clone(&clock), alarm);
        Ok(Self {
            config,
            clock,
            timers,
            executor: Rc::new(Executor::new()),
            running: Cell::new(false),
        })
    }

    /// The timer handler for this runtime's context.
    #[must_use]
    pub fn timers(&self) -> TimerHandler {
        self.timers.clone()
    }

    /// A handle for spawning tasks onto this runtime.
    #[must_use]
    pub fn spawner(&self) -> LocalSpawner {
        LocalSpawner::new(&self.executor)
    }

    /// The clock the runtime and its timers read.
    #[must_use]
    pub fn clock(&self) -> Rc<dyn TimeSource> {
        Rc::clone(&self.clock)
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of spawned tasks that have not finished.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.executor.task_count()
    }

    /// Run a future to completion on the current thread, driving spawned
    /// tasks and timers along the way.
    ///
    /// # Panics
    ///
    /// Panics if called from inside another `block_on` on this runtime, or if
    /// the root future is pending with no runnable task and no armed timer
    /// (it could never complete).
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        assert!(
            !self.running.replace(true),
            "block_on called re-entrantly on the same runtime"
        );
        let _reset = ResetOnDrop(&self.running);

        let wakers = Arc::clone(self.executor.wakers());
        wakers.wake_root();
        let waker = wakers.root_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = pin!(future);
        let budget = self.config.poll_budget;
        tracing::info!(clock = ?self.config.clock, "runtime started");

        loop {
            if wakers.take_root_wake() {
                if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                    tracing::info!(
                        polls = self.executor.polls(),
                        timers = self.timers.pending_count(),
                        "runtime finished"
                    );
                    return output;
                }
            }

            let polled = self.executor.run_ready(budget);
            let fired = self.deliver_alarm();
            if polled > 0 || fired > 0 {
                tracing::trace!(polled, fired, "event loop turn");
            }
            if wakers.root_woken() || self.executor.has_ready() {
                continue;
            }

            let Some(wake) = self.timers.alarm_wake_time() else {
                panic!(
                    "runtime deadlock: root future pending with {} idle task(s) and no timers",
                    self.executor.task_count()
                );
            };
            tracing::debug!(until = %wake, "parking until alarm");
            self.clock.park_until(wake);
            self.deliver_alarm();
        }
    }

    /// Hands a due alarm to the timer handler. Returns the callbacks run.
    fn deliver_alarm(&self) -> usize {
        if self.timers.take_alarm(self.clock.now()) {
            self.timers.on_alarm_fired()
        } else {
            0
        }
    }
}

impl Drop for LocalRuntime {
    fn drop(&mut self) {
        let dropped = self.executor.shutdown();
        if dropped > 0 {
            tracing::debug!(dropped, "runtime dropped with unfinished tasks");
        }
    }
}

struct ResetOnDrop<'a>(&'a Cell<bool>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
