//! Property tests for queue ordering, alarm tracking and backoff behavior.

mod common;

use common::{init_test_logging, test_proptest_config, virtual_handler, virtual_runtime, FireLog};
use localtimer::test_utils::drive_until;
use localtimer::time::{TimerCallback, TimerHandle, TimerQueue, TimerToken};
use localtimer::{ExponentialBackoff, Signal, Time};
use proptest::prelude::*;
use std::rc::Rc;
use std::time::Duration;

fn noop() -> Rc<dyn TimerCallback> {
    Rc::new(|_: Time| {})
}

#[derive(Debug, Clone)]
enum Op {
    Schedule(u16),
    Cancel(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1_u16..500).prop_map(Op::Schedule),
        1 => any::<usize>().prop_map(Op::Cancel),
    ]
}

proptest! {
    #![proptest_config(test_proptest_config(200))]

    #[test]
    fn queue_pops_by_deadline_then_insertion(deadlines in prop::collection::vec(0_u64..64, 0..80)) {
        init_test_logging();
        let mut queue = TimerQueue::new();
        let pushed: Vec<_> = deadlines
            .iter()
            .map(|&ms| queue.push(TimerToken::new(Time::from_millis(ms), Duration::ZERO, noop())))
            .collect();

        let mut popped = Vec::new();
        while let Some(idx) = queue.pop() {
            let order = pushed.iter().position(|&p| p == idx).expect("known index");
            popped.push((deadlines[order], order));
        }

        let mut expected: Vec<_> = deadlines.iter().copied().zip(0_usize..).collect();
        expected.sort_unstable();
        prop_assert_eq!(popped, expected);
        prop_assert_eq!(queue.owned(), deadlines.len());
        prop_assert_eq!(queue.clear().len(), deadlines.len());
    }

    #[test]
    fn alarm_always_tracks_the_soonest_pending_timer(ops in prop::collection::vec(op_strategy(), 1..60)) {
        init_test_logging();
        let (_clock, timers) = virtual_handler();
        let mut live: Vec<(TimerHandle, Time)> = Vec::new();

        for op in ops {
            match op {
                Op::Schedule(ms) => {
                    let at = Time::from_millis(u64::from(ms));
                    live.push((timers.schedule(at, Duration::ZERO, noop()), at));
                }
                Op::Cancel(pick) if !live.is_empty() => {
                    let (handle, _) = live.swap_remove(pick % live.len());
                    timers.cancel(handle);
                }
                Op::Cancel(_) => {}
            }
            let soonest = live.iter().map(|(_, at)| *at).min();
            prop_assert_eq!(timers.alarm_deadline(), soonest);
            prop_assert_eq!(timers.next_deadline(), soonest);
            prop_assert_eq!(timers.pending_count(), live.len());
        }

        for (handle, _) in live {
            timers.cancel(handle);
        }
        prop_assert!(timers.alarm_deadline().is_none());
    }

    #[test]
    fn one_shots_fire_exactly_at_their_deadlines(delays in prop::collection::vec(1_u64..200, 1..40)) {
        init_test_logging();
        let (clock, timers) = virtual_handler();
        let log = FireLog::new();
        let handles: Vec<_> = delays
            .iter()
            .map(|&ms| timers.schedule_once_after(Duration::from_millis(ms), log.callback("t")))
            .collect();

        let fired = drive_until(&timers, &clock, Time::from_millis(200));
        prop_assert_eq!(fired, delays.len());

        let mut expected = delays.clone();
        expected.sort_unstable();
        prop_assert_eq!(log.times_ms(), expected);
        prop_assert!(handles.iter().all(|h| !timers.is_live(h)));
        prop_assert!(timers.is_empty());
    }

    #[test]
    fn backoff_delay_stays_within_bounds(
        min_ms in 1_u64..50,
        span in 1_u64..20,
        growth in 1.1_f64..3.0,
        shrink in 0.0_f64..0.9,
        outcomes in prop::collection::vec(any::<bool>(), 1..30),
    ) {
        init_test_logging();
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(min_ms * span);
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::new(min, max, growth, shrink);

        let (napped, delays) = runtime.block_on(async {
            let mut napped = Duration::ZERO;
            let mut delays = Vec::new();
            for &failed in &outcomes {
                if failed {
                    let before = backoff.current_delay();
                    let start = timers.now();
                    backoff.on_failure(&timers, &interruptor).await.expect("never interrupted");
                    let slept = timers.now() - start;
                    assert_eq!(slept, before, "failure naps for the delay it started with");
                    napped += slept;
                } else {
                    backoff.on_success();
                }
                delays.push(backoff.current_delay());
            }
            (napped, delays)
        });

        for delay in delays {
            prop_assert!(delay.is_zero() || (delay >= min && delay <= max), "delay {:?} out of [{:?}, {:?}]", delay, min, max);
        }
        prop_assert_eq!(timers.now() - Time::ZERO, napped);
    }

    #[test]
    fn backoff_runs_move_the_delay_one_way(
        min_ms in 1_u64..50,
        span in 1_u64..20,
        growth in 1.1_f64..3.0,
        shrink in 0.0_f64..0.9,
        runs in prop::collection::vec((1_usize..8, 1_usize..8), 1..4),
    ) {
        init_test_logging();
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(min_ms * span);
        let runtime = virtual_runtime();
        let timers = runtime.timers();
        let interruptor = Signal::new();
        let mut backoff = ExponentialBackoff::new(min, max, growth, shrink);

        for (failures, successes) in runs {
            let grown = runtime.block_on(async {
                let mut seen = vec![backoff.current_delay()];
                for _ in 0..failures {
                    backoff.on_failure(&timers, &interruptor).await.expect("never interrupted");
                    seen.push(backoff.current_delay());
                }
                seen
            });
            prop_assert!(grown.windows(2).all(|w| w[1] >= w[0]), "failure run shrank: {:?}", grown);

            let mut shrunk = vec![backoff.current_delay()];
            for _ in 0..successes {
                backoff.on_success();
                shrunk.push(backoff.current_delay());
            }
            prop_assert!(shrunk.windows(2).all(|w| w[1] <= w[0]), "success run grew: {:?}", shrunk);
        }

        // Enough successes always land exactly on zero.
        let mut steps = 0;
        while !backoff.current_delay().is_zero() {
            backoff.on_success();
            steps += 1;
            prop_assert!(steps <= 64, "delay {:?} never reset", backoff.current_delay());
        }
        prop_assert_eq!(backoff.current_delay(), Duration::ZERO);
    }
}
