//! Task-level sleeping.
//!
//! `nap` suspends the calling task on a [`SignalTimer`]; the interruptible
//! variant races that timer against an interruptor [`Signal`].
//!
//! # Cancel Safety
//!
//! Both futures are cancel-safe: dropping them drops the signal timer, which
//! cancels its pending token.

use super::handler::TimerHandler;
use super::signal_timer::SignalTimer;
use crate::error::Canceled;
use crate::sync::Signal;
use futures_lite::future;
use std::time::Duration;

/// Suspends the calling task for `duration`. Zero returns without
/// suspending.
pub async fn nap(handler: &TimerHandler, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let timer = SignalTimer::started(handler, duration);
    timer.wait().await;
}

/// Suspends the calling task for `duration`, or until `interruptor` is
/// pulsed, whichever comes first.
///
/// # Errors
///
/// Returns [`Canceled`] if the interruptor was already pulsed on entry or is
/// pulsed before the duration elapses. The pending timer is canceled in that
/// case.
pub async fn nap_interruptible(
    handler: &TimerHandler,
    duration: Duration,
    interruptor: &Signal,
) -> Result<(), Canceled> {
    if interruptor.is_pulsed() {
        return Err(Canceled);
    }
    let timer = SignalTimer::started(handler, duration);
    let outcome = future::or(
        async {
            timer.wait().await;
            Ok(())
        },
        async {
            interruptor.wait().await;
            Err(Canceled)
        },
    )
    .await;
    if outcome.is_err() {
        tracing::trace!(duration_ms = duration.as_millis(), "nap interrupted");
    }
    outcome
}
