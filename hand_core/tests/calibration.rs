mod common;

use std::time::Duration;

use common::{ROMS, STOPS, assert_close, connected_rig};
use hand_config::{KEY_CALIBRATED, KEY_MOTOR_LIMITS, KEY_RATIOS};
use hand_core::mocks::RecordingOperator;
use hand_core::{Bound, CalibrationBudget, HandError, hand_error};
use hand_traits::{ManualRequest, Pose};

#[test]
fn auto_calibration_finds_every_stop() {
    let mut rig = connected_rig();
    let report = rig.hand.calibrate().expect("calibration succeeds");

    assert!(report.calibrated);
    assert!(rig.hand.is_calibrated());
    assert_eq!(report.strategy, "auto");
    assert_eq!(report.steps.len(), 3);

    let state = rig.hand.calibration_state();
    for (i, motor) in [1u8, 2, 3].into_iter().enumerate() {
        let (min, max) = state.limits(motor).both().expect("both limits");
        assert_close(min, STOPS[i].0, 1e-6);
        assert_close(max, STOPS[i].1, 1e-6);
        let expected = (STOPS[i].1 - STOPS[i].0) / (ROMS[i].1 - ROMS[i].0);
        assert_close(report.ratios[&motor], expected, 1e-6);
        assert!(report.ratios[&motor] > 0.0);
    }

    // every bound found by the step that drove it
    let first = &report.steps[0];
    assert!(first.samples.iter().all(|s| s.bound == Bound::Upper));
    assert!(first.ready.is_empty());
    assert_eq!(report.steps[1].ready, vec![1, 2]);
    assert!(first.traces[&1].currents.last().copied().unwrap_or(0.0) >= 200.0);

    // persisted
    let table = rig.store.snapshot();
    assert_eq!(table[KEY_CALIBRATED].as_bool(), Some(true));
    assert_eq!(table[KEY_RATIOS].as_table().unwrap().len(), 3);
    assert_eq!(table[KEY_MOTOR_LIMITS].as_table().unwrap().len(), 3);

    // left at the zero pose with the operating current restored
    assert_close(rig.sim.position(1).unwrap(), STOPS[0].0, 1e-6);
    assert_eq!(rig.sim.current_limit(2), Some(300.0));
    assert_eq!(rig.sim.mode(3), Some(5));
    let joints = rig.hand.joint_positions().unwrap();
    assert_close(joints["index_mcp"].unwrap(), 0.0, 1e-6);

    // all pauses were virtual
    assert!(rig.clock.elapsed() > Duration::from_secs(3));
}

#[test]
fn persists_after_each_step_and_flag_last() {
    let mut rig = connected_rig();
    rig.hand.calibrate().unwrap();
    let log = rig.store.write_log();
    // ratios + limits per step, then the flag
    assert_eq!(log.len(), 3 * 2 + 1);
    assert_eq!(&log[..2], &[KEY_RATIOS.to_string(), KEY_MOTOR_LIMITS.to_string()]);
    assert_eq!(log.last().map(String::as_str), Some(KEY_CALIBRATED));
}

#[test]
fn iteration_budget_raises_timeout() {
    let mut rig = connected_rig();
    rig.hand.set_calibration_budget(CalibrationBudget {
        max_iterations: Some(5),
        max_duration: None,
    });
    let err = rig.hand.calibrate().unwrap_err();
    match hand_error(&err) {
        Some(HandError::CalibrationTimeout {
            step,
            pending,
            iterations,
        }) => {
            assert_eq!(*step, 1);
            assert_eq!(*iterations, 5);
            assert_eq!(pending, &vec![2, 1]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(rig.store.write_log().is_empty());
}

#[test]
fn wall_clock_budget_uses_injected_clock() {
    let mut rig = connected_rig();
    rig.hand.set_calibration_budget(CalibrationBudget {
        max_iterations: None,
        max_duration: Some(Duration::from_millis(50)),
    });
    let err = rig.hand.calibrate().unwrap_err();
    assert!(matches!(
        hand_error(&err),
        Some(HandError::CalibrationTimeout { step: 1, .. })
    ));
    // 10 ms per iteration on the virtual clock
    assert!(rig.clock.elapsed() >= Duration::from_millis(50));
    assert!(rig.clock.elapsed() < Duration::from_millis(100));
}

#[test]
fn cancelled_before_start_touches_nothing() {
    let mut rig = connected_rig();
    rig.hand.cancel_token().cancel();
    let err = rig.hand.calibrate().unwrap_err();
    assert_eq!(hand_error(&err), Some(&HandError::Cancelled));
    assert_eq!(rig.sim.position_writes(), 0);
    assert_eq!(rig.sim.torque_enabled(1), Some(false));
    // the token is cleared for the next run
    assert!(rig.hand.calibrate().is_ok());
}

#[test]
fn write_failure_keeps_completed_steps() {
    let mut rig = connected_rig();
    // step 1 takes fewer than 20 writes, step 2 more
    rig.sim.fail_position_writes_after(20);
    let err = rig.hand.calibrate().unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::HardwareFault(_))));

    let table = rig.store.snapshot();
    assert!(table.get(KEY_CALIBRATED).is_none());
    let limits = table[KEY_MOTOR_LIMITS].as_table().unwrap();
    let m1 = limits["1"].as_table().unwrap();
    assert_close(m1["max"].as_float().unwrap(), STOPS[0].1, 1e-6);
    assert!(m1.get("min").is_none());
    assert!(table[KEY_RATIOS].as_table().unwrap().is_empty());
    assert!(!rig.hand.is_calibrated());
}

#[test]
fn manual_calibration_reads_operator_poses() {
    let mut rig = connected_rig();
    let sim = rig.sim.clone();
    let mut operator =
        RecordingOperator::new(move |req: &ManualRequest<'_>| sim.backdrive_to(req.motor, req.pose));

    let report = rig.hand.calibrate_manual(&mut operator).unwrap();

    assert_eq!(report.strategy, "manual");
    assert!(report.calibrated);
    // two poses per joint visit: 2 + 3 + 1 visits
    assert_eq!(operator.requests.len(), 12);
    assert_eq!(operator.requests[0].2, Pose::Flexed);
    assert_eq!(operator.requests[1].2, Pose::Extended);

    let state = rig.hand.calibration_state();
    for (i, motor) in [1u8, 2, 3].into_iter().enumerate() {
        assert_eq!(state.limits(motor).both(), Some(STOPS[i]));
    }
    assert_eq!(rig.sim.torque_enabled(1), Some(true));
    assert_eq!(rig.sim.current_limit(1), Some(300.0));
    assert_eq!(rig.store.snapshot()[KEY_CALIBRATED].as_bool(), Some(true));
}

#[test]
fn degenerate_manual_run_leaves_previous_calibration_intact() {
    let mut rig = connected_rig();
    let fresh = rig.hand.calibration_state().version();
    rig.hand.calibrate().unwrap();
    let before = rig.hand.calibration_state().clone();
    assert!(before.version() > fresh);
    let snapshot = rig.store.snapshot();
    let writes = rig.store.write_log().len();

    // operator acknowledges without moving the hand: both poses read the same
    let mut operator = RecordingOperator::new(|_: &ManualRequest<'_>| {});
    let err = rig.hand.calibrate_manual(&mut operator).unwrap_err();
    assert_eq!(
        hand_error(&err),
        Some(&HandError::DegenerateLimits {
            motor: 2,
            joint: "index_mcp".into()
        })
    );
    assert_eq!(operator.requests.len(), 2);

    let after = rig.hand.calibration_state();
    assert!(rig.hand.is_calibrated());
    assert_eq!(after.version(), before.version());
    for motor in [1u8, 2, 3] {
        assert_eq!(after.limits(motor).both(), before.limits(motor).both());
        assert_eq!(after.ratio(motor), before.ratio(motor));
    }
    let (min, max) = after.limits(2).both().unwrap();
    assert_close(min, STOPS[1].0, 1e-6);
    assert_close(max, STOPS[1].1, 1e-6);
    assert_eq!(rig.store.write_log().len(), writes);
    assert_eq!(rig.store.snapshot(), snapshot);
}

#[test]
fn manual_calibration_can_be_cancelled_by_operator() {
    let mut rig = connected_rig();
    let token = rig.hand.cancel_token();
    let mut operator = RecordingOperator::new(move |_: &ManualRequest<'_>| token.cancel());
    let err = rig.hand.calibrate_manual(&mut operator).unwrap_err();
    assert_eq!(hand_error(&err), Some(&HandError::Cancelled));
    assert_eq!(operator.requests.len(), 1);
}

#[test]
fn operator_failure_aborts_manual_run() {
    let mut rig = connected_rig();
    let mut operator = |_: &ManualRequest<'_>| -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("stdin closed".into())
    };
    let err = rig.hand.calibrate_manual(&mut operator).unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Operator(m)) if m.contains("stdin closed")));
}
