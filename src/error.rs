//! Error types.
//!
//! Very little in this crate can fail in a recoverable way. Time is always
//! available and nothing here performs I/O, so the error surface is small:
//!
//! - [`Canceled`]: an interruptible wait was cut short by its interruptor.
//!   This is an expected outcome and is handed back to the immediate caller.
//! - [`ConfigError`]: a configuration value was rejected while building a
//!   runtime or a backoff policy.
//!
//! Misuse of the timer API (zero intervals where a positive one is required,
//! starting a signal timer twice, canceling a handle that is no longer live,
//! dropping a handler that still owns timers) is a programming defect. Those
//! paths panic with a descriptive message instead of returning an error.

use thiserror::Error;

/// An interruptible wait observed its interruptor before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("wait interrupted before its deadline")]
pub struct Canceled;

/// A configuration value was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {var}: {reason} (got {value:?})")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The raw value found in the environment.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
    /// The backoff growth factor does not strictly increase the delay.
    #[error("backoff growth factor must be greater than 1.0, got {0}")]
    GrowthFactor(f64),
    /// The backoff shrink factor is outside `[0.0, 1.0)`.
    #[error("backoff shrink factor must be in [0.0, 1.0), got {0}")]
    ShrinkFactor(f64),
    /// The minimum backoff delay is zero.
    #[error("backoff minimum delay must be positive")]
    ZeroMinDelay,
    /// The minimum backoff delay exceeds the maximum.
    #[error("backoff minimum delay {min_ms}ms exceeds maximum {max_ms}ms")]
    DelayRange {
        /// Configured minimum, in milliseconds.
        min_ms: u64,
        /// Configured maximum, in milliseconds.
        max_ms: u64,
    },
    /// The runtime poll budget is zero.
    #[error("poll budget must be at least 1")]
    ZeroPollBudget,
}
