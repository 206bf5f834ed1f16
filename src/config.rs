//! Configuration for the local runtime and the backoff policy.
//!
//! In most cases you should use
//! [`LocalRuntimeBuilder`](crate::runtime::LocalRuntimeBuilder) rather than
//! filling in a [`RuntimeConfig`] by hand.
//!
//! # Runtime defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `clock` | [`ClockKind::Wall`] |
//! | `alarm_slack` | 0 |
//! | `poll_budget` | 128 |
//!
//! # Environment variables
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set through builder methods
//! 2. **Environment variables**: the `LOCALTIMER_*` variables below
//! 3. **Defaults**: [`RuntimeConfig::default()`]
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `LOCALTIMER_CLOCK` | `wall` / `virtual` | `clock` |
//! | `LOCALTIMER_ALARM_SLACK_US` | `u64` microseconds | `alarm_slack` |
//! | `LOCALTIMER_POLL_BUDGET` | `u32` | `poll_budget` |
//!
//! # Backoff
//!
//! [`BackoffConfig`] is plain data with `serde` support so a policy can live in
//! an application's own config file. Delays are whole milliseconds.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable selecting the clock.
pub const ENV_CLOCK: &str = "LOCALTIMER_CLOCK";
/// Environment variable for the alarm's early-fire slack, in microseconds.
pub const ENV_ALARM_SLACK_US: &str = "LOCALTIMER_ALARM_SLACK_US";
/// Environment variable for the executor poll budget.
pub const ENV_POLL_BUDGET: &str = "LOCALTIMER_POLL_BUDGET";

/// Which time source a runtime reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Real monotonic time; waiting sleeps the thread.
    #[default]
    Wall,
    /// Virtual time; waiting jumps straight to the next deadline.
    Virtual,
}

/// Local runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Time source.
    pub clock: ClockKind,
    /// How early the alarm may deliver its notification.
    pub alarm_slack: Duration,
    /// Task polls per event-loop turn before the loop re-checks the alarm.
    pub poll_budget: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clock: ClockKind::Wall,
            alarm_slack: Duration::ZERO,
            poll_budget: 128,
        }
    }
}

impl RuntimeConfig {
    /// Checks the configuration for values the runtime cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_budget == 0 {
            return Err(ConfigError::ZeroPollBudget);
        }
        Ok(())
    }
}

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_CLOCK) {
        config.clock = parse_clock(&val)?;
    }
    if let Some(val) = read_env(ENV_ALARM_SLACK_US) {
        config.alarm_slack = Duration::from_micros(parse_u64(ENV_ALARM_SLACK_US, &val)?);
    }
    if let Some(val) = read_env(ENV_POLL_BUDGET) {
        config.poll_budget = parse_u32(ENV_POLL_BUDGET, &val)?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_clock(val: &str) -> Result<ClockKind, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "wall" | "real" => Ok(ClockKind::Wall),
        "virtual" | "lab" => Ok(ClockKind::Virtual),
        _ => Err(ConfigError::InvalidEnv {
            var: ENV_CLOCK,
            value: val.to_string(),
            reason: "expected wall or virtual",
        }),
    }
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: val.to_string(),
        reason: "expected unsigned integer",
    })
}

fn parse_u32(var: &'static str, val: &str) -> Result<u32, ConfigError> {
    val.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: val.to_string(),
        reason: "expected u32",
    })
}

/// Parameters of an [`ExponentialBackoff`](crate::combinator::ExponentialBackoff).
///
/// | Field | Default |
/// |-------|---------|
/// | `min_delay_ms` | 10 |
/// | `max_delay_ms` | 10 000 |
/// | `growth_factor` | 1.5 |
/// | `shrink_factor` | 0.0 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failure that is preceded by a failure.
    pub min_delay_ms: u64,
    /// Upper bound on the delay.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay on each failure.
    pub growth_factor: f64,
    /// Multiplier applied to the delay on each success.
    pub shrink_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 10_000,
            growth_factor: 1.5,
            shrink_factor: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Minimum delay as a [`Duration`].
    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// Maximum delay as a [`Duration`].
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Rejects factor and delay combinations that cannot make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_ms == 0 {
            return Err(ConfigError::ZeroMinDelay);
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::DelayRange {
                min_ms: self.min_delay_ms,
                max_ms: self.max_delay_ms,
            });
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(ConfigError::GrowthFactor(self.growth_factor));
        }
        if !(0.0..1.0).contains(&self.shrink_factor) {
            return Err(ConfigError::ShrinkFactor(self.shrink_factor));
        }
        Ok(())
    }
}
