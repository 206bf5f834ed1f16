#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use localtimer::runtime::{LocalRuntime, LocalRuntimeBuilder};
use localtimer::time::{TimerCallback, TimerHandler, VirtualClock};
use localtimer::types::Time;
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "LOCALTIMER_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor an existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Logs the start of a test.
pub fn init_test(name: &str) {
    init_test_logging();
    localtimer::test_phase!(name);
}

/// A runtime on virtual time.
#[must_use]
pub fn virtual_runtime() -> LocalRuntime {
    LocalRuntimeBuilder::new()
        .virtual_clock()
        .build()
        .expect("failed to build test runtime")
}

/// A bare handler over a virtual clock, for driving without a runtime.
#[must_use]
pub fn virtual_handler() -> (Rc<VirtualClock>, TimerHandler) {
    let clock = Rc::new(VirtualClock::new());
    let timers = TimerHandler::with_virtual_clock(clock.clone());
    (clock, timers)
}

/// Records `(label, now)` for every firing of the callbacks it hands out.
#[derive(Debug, Clone, Default)]
pub struct FireLog {
    entries: Rc<RefCell<Vec<(&'static str, Time)>>>,
}

impl FireLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that appends `label` to the log.
    #[must_use]
    pub fn callback(&self, label: &'static str) -> Rc<dyn TimerCallback> {
        let entries = Rc::clone(&self.entries);
        Rc::new(move |now: Time| entries.borrow_mut().push((label, now)))
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.borrow().iter().map(|(label, _)| *label).collect()
    }

    #[must_use]
    pub fn times_ms(&self) -> Vec<u64> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, at)| at.as_millis())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}
