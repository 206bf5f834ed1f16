//! Exponential backoff between retries.
//!
//! [`ExponentialBackoff`] tracks a single delay that grows on every failure
//! and shrinks on every success:
//!
//! - The first failure after a clean run only yields to other tasks, then
//!   arms the delay at `min`.
//! - Each later failure naps for the current delay, then multiplies it by the
//!   growth factor (capped at `max`).
//! - Each success multiplies the delay by the shrink factor; once it drops
//!   below `min` it resets to zero.
//!
//! # Cancellation Handling
//!
//! The nap in [`on_failure`](ExponentialBackoff::on_failure) is interruptible.
//! An interrupted nap leaves the delay untouched and returns
//! [`Canceled`].

use crate::config::BackoffConfig;
use crate::error::{Canceled, ConfigError};
use crate::sync::Signal;
use crate::time::{nap_interruptible, TimerHandler};
use std::time::Duration;

/// Default multiplier applied on failure.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.5;
/// Default multiplier applied on success.
pub const DEFAULT_SHRINK_FACTOR: f64 = 0.0;

/// Adaptive delay between retries of a failing operation.
///
/// # Example
///
/// ```
/// use localtimer::combinator::ExponentialBackoff;
/// use localtimer::runtime::LocalRuntimeBuilder;
/// use localtimer::sync::Signal;
/// use std::time::Duration;
///
/// let runtime = LocalRuntimeBuilder::new().virtual_clock().build().unwrap();
/// let timers = runtime.timers();
/// let interruptor = Signal::new();
/// let mut backoff = ExponentialBackoff::with_defaults(
///     Duration::from_millis(10),
///     Duration::from_millis(100),
/// );
///
/// runtime.block_on(async {
///     backoff.on_failure(&timers, &interruptor).await.unwrap();
///     assert_eq!(backoff.current_delay(), Duration::from_millis(10));
///     backoff.on_failure(&timers, &interruptor).await.unwrap();
///     assert_eq!(backoff.current_delay(), Duration::from_millis(15));
/// });
/// backoff.on_success();
/// assert_eq!(backoff.current_delay(), Duration::ZERO);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    growth: f64,
    shrink: f64,
    current: Duration,
}

impl ExponentialBackoff {
    /// Creates a policy with explicit factors. The delay starts at zero.
    #[must_use]
    pub fn new(min: Duration, max: Duration, growth: f64, shrink: f64) -> Self {
        Self {
            min,
            max,
            growth,
            shrink,
            current: Duration::ZERO,
        }
    }

    /// Creates a policy with the default growth (1.5) and shrink (0.0)
    /// factors.
    #[must_use]
    pub fn with_defaults(min: Duration, max: Duration) -> Self {
        Self::new(min, max, DEFAULT_GROWTH_FACTOR, DEFAULT_SHRINK_FACTOR)
    }

    /// Creates a policy from validated configuration.
    pub fn from_config(config: &BackoffConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            config.min_delay(),
            config.max_delay(),
            config.growth_factor,
            config.shrink_factor,
        ))
    }

    /// The delay the next failure will nap for.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current
    }

    /// Records a failure and waits before the caller retries.
    ///
    /// # Errors
    ///
    /// Returns [`Canceled`] if `interruptor` is pulsed before the nap ends.
    ///
    /// # Panics
    ///
    /// Panics if the growth factor fails to increase the delay, even when the
    /// delay is already pinned at `max`.
    pub async fn on_failure(
        &mut self,
        handler: &TimerHandler,
        interruptor: &Signal,
    ) -> Result<(), Canceled> {
        if self.current.is_zero() {
            futures_lite::future::yield_now().await;
            self.current = self.min;
            tracing::trace!(delay_ms = self.current.as_millis(), "backoff armed");
            return Ok(());
        }

        nap_interruptible(handler, self.current, interruptor).await?;
        let grown = self.current.mul_f64(self.growth);
        assert!(
            grown > self.current,
            "backoff growth factor {} did not increase the delay",
            self.growth
        );
        self.current = grown.min(self.max);
        tracing::trace!(delay_ms = self.current.as_millis(), "backoff grew");
        Ok(())
    }

    /// Records a success, shrinking the delay.
    ///
    /// # Panics
    ///
    /// Panics if the shrink factor fails to decrease a non-zero delay.
    pub fn on_success(&mut self) {
        let shrunk = self.current.mul_f64(self.shrink);
        assert!(
            shrunk < self.current || self.current.is_zero(),
            "backoff shrink factor {} did not decrease the delay",
            self.shrink
        );
        self.current = if shrunk < self.min {
            Duration::ZERO
        } else {
            shrunk
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{LocalRuntime, LocalRuntimeBuilder};
    use crate::test_utils::init_test_logging;
    use crate::types::Time;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn virtual_runtime() -> LocalRuntime {
        LocalRuntimeBuilder::new()
            .virtual_clock()
            .build()
            .expect("runtime")
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn failures_grow_to_the_cap() {
        init_test("failures_grow_to_the_cap");
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::with_defaults(ms(10), ms(30));

        let delays = runtime.block_on(async {
            let mut delays = Vec::new();
            for _ in 0..5 {
                backoff.on_failure(&timers, &interruptor).await.expect("not interrupted");
                delays.push(backoff.current_delay());
            }
            delays
        });
        let expected = vec![ms(10), ms(15), Duration::from_micros(22_500), ms(30), ms(30)];
        crate::assert_with_log!(delays == expected, "growth then cap", expected, delays);

        // Slept 0 + 10 + 15 + 22.5 + 30.
        let now = timers.now();
        let slept = Time::from_nanos(77_500_000);
        crate::assert_with_log!(now == slept, "total nap", slept, now);
        crate::test_complete!("failures_grow_to_the_cap");
    }

    #[test]
    fn first_failure_only_yields() {
        init_test("first_failure_only_yields");
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::with_defaults(ms(10), ms(100));

        runtime.block_on(async {
            backoff.on_failure(&timers, &interruptor).await.expect("ok");
        });
        crate::assert_with_log!(timers.now() == Time::ZERO, "no time passed", Time::ZERO, timers.now());
        crate::assert_with_log!(timers.stats().scheduled == 0, "no timer", 0, timers.stats().scheduled);
        crate::test_complete!("first_failure_only_yields");
    }

    #[test]
    fn success_with_zero_shrink_resets() {
        init_test("success_with_zero_shrink_resets");
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::with_defaults(ms(10), ms(100));

        runtime.block_on(async {
            backoff.on_failure(&timers, &interruptor).await.expect("ok");
            backoff.on_failure(&timers, &interruptor).await.expect("ok");
        });
        backoff.on_success();
        crate::assert_with_log!(backoff.current_delay().is_zero(), "reset", Duration::ZERO, backoff.current_delay());
        // Success on a zero delay is allowed.
        backoff.on_success();
        crate::test_complete!("success_with_zero_shrink_resets");
    }

    #[test]
    fn partial_shrink_steps_down_then_resets() {
        init_test("partial_shrink_steps_down_then_resets");
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::new(ms(10), ms(100), 2.0, 0.5);

        runtime.block_on(async {
            for _ in 0..4 {
                backoff.on_failure(&timers, &interruptor).await.expect("ok");
            }
        });
        crate::assert_with_log!(backoff.current_delay() == ms(80), "grown", ms(80), backoff.current_delay());

        let mut steps = Vec::new();
        for _ in 0..4 {
            backoff.on_success();
            steps.push(backoff.current_delay());
        }
        let expected = vec![ms(40), ms(20), ms(10), Duration::ZERO];
        crate::assert_with_log!(steps == expected, "halving then reset", expected, steps);
        crate::test_complete!("partial_shrink_steps_down_then_resets");
    }

    #[test]
    fn interrupted_failure_keeps_the_delay() {
        init_test("interrupted_failure_keeps_the_delay");
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::with_defaults(ms(10), ms(100));

        runtime.block_on(async {
            backoff.on_failure(&timers, &interruptor).await.expect("ok");
        });
        interruptor.pulse();
        let outcome = runtime.block_on(backoff.on_failure(&timers, &interruptor));
        crate::assert_with_log!(outcome == Err(Canceled), "canceled", Err::<(), _>(Canceled), outcome);
        crate::assert_with_log!(backoff.current_delay() == ms(10), "unchanged", ms(10), backoff.current_delay());
        crate::test_complete!("interrupted_failure_keeps_the_delay");
    }

    #[test]
    fn from_config_validates() {
        let config = BackoffConfig {
            min_delay_ms: 5,
            max_delay_ms: 50,
            growth_factor: 2.0,
            shrink_factor: 0.25,
        };
        let backoff = ExponentialBackoff::from_config(&config).expect("valid");
        assert_eq!(backoff, ExponentialBackoff::new(ms(5), ms(50), 2.0, 0.25));

        let bad = BackoffConfig {
            growth_factor: 0.9,
            ..config
        };
        assert_eq!(
            ExponentialBackoff::from_config(&bad),
            Err(ConfigError::GrowthFactor(0.9))
        );
    }

    #[test]
    #[should_panic(expected = "did not increase")]
    fn non_growing_factor_panics() {
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::new(ms(10), ms(100), 1.0, 0.0);
        runtime.block_on(async {
            backoff.on_failure(&timers, &interruptor).await.expect("ok");
            backoff.on_failure(&timers, &interruptor).await.expect("ok");
        });
    }

    #[test]
    #[should_panic(expected = "did not increase")]
    fn non_growing_factor_panics_at_the_cap() {
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::new(ms(10), ms(10), 1.0, 0.0);
        runtime.block_on(async {
            for _ in 0..3 {
                backoff.on_failure(&timers, &interruptor).await.expect("ok");
            }
        });
    }

    #[test]
    #[should_panic(expected = "did not decrease")]
    fn non_shrinking_factor_panics() {
        let mut backoff = ExponentialBackoff::new(ms(10), ms(100), 2.0, 1.0);
        backoff.current = ms(20);
        backoff.on_success();
    }
}
