use std::time::Duration;

use hapbridge_core::error::BuildError;
use hapbridge_core::mocks::{NullActuator, NullTracker};
use hapbridge_core::{FeedbackCfg, FeedbackSupervisor};
use rstest::rstest;

#[rstest]
fn builder_missing_tracker_yields_typed_build_error() {
    let err = FeedbackSupervisor::builder()
        // missing with_tracker()
        .with_actuator(NullActuator)
        .try_build()
        .expect_err("should fail with MissingTracker");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingTracker) => {}
        other => panic!("expected MissingTracker, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_actuator_yields_typed_build_error() {
    let err = FeedbackSupervisor::builder()
        .with_tracker(NullTracker)
        .try_build()
        .expect_err("should fail with MissingActuator");
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::MissingActuator)
    );
}

#[rstest]
#[case::zero_tick(FeedbackCfg { tick: Duration::ZERO, ..FeedbackCfg::default() }, "tick period")]
#[case::no_blinks(FeedbackCfg { low_battery_blinks: 0, ..FeedbackCfg::default() }, "low_battery_blinks")]
fn builder_rejects_unusable_timing(#[case] feedback: FeedbackCfg, #[case] needle: &str) {
    let err = FeedbackSupervisor::builder()
        .with_tracker(NullTracker)
        .with_actuator(NullActuator)
        .with_feedback(feedback)
        .build()
        .expect_err("invalid timing must be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[test]
fn builder_with_defaults_starts_empty() {
    let sup = FeedbackSupervisor::builder()
        .with_tracker(NullTracker)
        .with_actuator(NullActuator)
        .build()
        .unwrap();
    assert!(sup.serials().is_empty());
    assert_eq!(sup.feedback_cfg(), &FeedbackCfg::default());
    // Nothing attached, nothing routed.
    assert_eq!(sup.on_value("/avatar/parameters/...", 0.5), 0);
}
