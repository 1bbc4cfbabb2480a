//! Feedback worker threads must stop promptly and never outlive their owner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hapbridge_core::mocks::{NullActuator, NullTracker};
use hapbridge_core::slot::TargetSlot;
use hapbridge_core::{
    CompensationCfg, ConfigStore, Device, FeedbackCfg, FeedbackLoop, FeedbackWorker, LoopDeps,
};
use hapbridge_traits::{Clock, MonotonicClock};

fn feedback_loop(serial: &str, tick: Duration) -> FeedbackLoop {
    let clock = MonotonicClock::new();
    let deps = LoopDeps {
        tracker: Arc::new(NullTracker),
        actuator: Arc::new(NullActuator),
        config: Arc::new(ConfigStore::default()),
        clock: Arc::new(clock),
    };
    let slot = Arc::new(TargetSlot::new());
    slot.set_target(0.5, clock.now());
    FeedbackLoop::new(
        Device::new(0, "Tundra Tracker", serial),
        slot,
        deps,
        FeedbackCfg {
            tick,
            ..FeedbackCfg::default()
        },
        &CompensationCfg::default(),
        clock.now(),
    )
}

#[test]
fn worker_ticks_and_exits_on_drop() {
    let worker = FeedbackWorker::spawn(feedback_loop("W1", Duration::from_millis(5))).unwrap();
    assert_eq!(worker.serial(), "W1");
    std::thread::sleep(Duration::from_millis(40));
    assert!(worker.is_running());
    let stats = worker.stats();
    assert!(stats.ticks >= 2, "{stats:?}");
    assert!(stats.pulses >= 2, "{stats:?}");
    drop(worker);
}

#[test]
fn many_workers_dont_leak_threads() {
    for i in 0..10 {
        let worker =
            FeedbackWorker::spawn(feedback_loop(&format!("W{i}"), Duration::from_millis(5)))
                .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let _ = worker.stats();
        drop(worker);
    }
}

#[test]
fn shutdown_is_prompt_even_with_long_tick() {
    let worker = FeedbackWorker::spawn(feedback_loop("W2", Duration::from_secs(5))).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    // The stop signal wakes the wait; no need to sit out the period.
    let start = Instant::now();
    drop(worker);
    let elapsed = start.elapsed();
    assert!(
        elapsed < Duration::from_millis(200),
        "shutdown took {elapsed:?}"
    );
}

#[test]
fn stats_average_is_bounded_by_max() {
    let worker = FeedbackWorker::spawn(feedback_loop("W3", Duration::from_millis(2))).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    let s = worker.stats();
    assert!(s.avg_tick_us <= s.max_tick_us);
    assert!(s.pulses <= s.ticks);
}
