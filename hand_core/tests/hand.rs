mod common;

use std::collections::BTreeMap;

use common::{assert_close, connected_rig, rig, rig_with_store, store_from};
use hand_config::{KEY_CALIBRATED, MemoryStore};
use hand_core::mocks::NoopBus;
use hand_core::{ControlMode, HandBuilder, HandError, MaxCurrent, hand_error};
use hand_traits::test_clock::TestClock;

const CALIBRATED: &str = r#"
calibrated = true

[motor_limits.1]
min = -1.0
max = 1.0

[motor_limits.2]
min = -1.05
max = 1.1

[motor_limits.3]
min = -1.1
max = 1.2
"#;

const PARTIAL: &str = r#"
calibrated = true

[motor_limits.1]
min = -1.0
max = 1.0

[motor_limits.2]
max = 1.1
"#;

fn targets(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(j, v)| (j.to_string(), *v)).collect()
}

#[test]
fn operations_before_connect_fail_with_not_connected() {
    let rig = rig();
    let err = rig.hand.motor_positions().unwrap_err();
    assert_eq!(hand_error(&err), Some(&HandError::NotConnected));
    let err = rig.hand.enable_torque(None).unwrap_err();
    assert_eq!(hand_error(&err), Some(&HandError::NotConnected));
    let err = rig
        .hand
        .set_joint_positions(&targets(&[("thumb_mcp", 0.0)]))
        .unwrap_err();
    assert_eq!(hand_error(&err), Some(&HandError::NotConnected));
}

#[test]
fn connect_failure_is_reported_not_raised() {
    let hand = HandBuilder::new()
        .with_bus(NoopBus)
        .with_config(common::config())
        .build()
        .unwrap();
    let status = hand.connect();
    assert!(!status.ok);
    assert!(status.message.starts_with("Connection failed"));
    assert!(!hand.is_connected());
}

#[test]
fn overclaiming_flag_is_corrected_at_build() {
    let store = store_from(PARTIAL);
    let rig = rig_with_store(store.clone());
    assert!(!rig.hand.is_calibrated());
    assert_eq!(store.snapshot()[KEY_CALIBRATED].as_bool(), Some(false));
    assert_eq!(store.write_log(), vec![KEY_CALIBRATED.to_string()]);
}

#[test]
fn consistent_flag_is_left_alone() {
    let store = store_from(CALIBRATED);
    let rig = rig_with_store(store.clone());
    assert!(rig.hand.is_calibrated());
    assert!(store.write_log().is_empty());
}

#[test]
fn identical_stored_limits_are_not_calibrated_even_with_a_ratio() {
    let store = store_from(&format!(
        "{}\n[joint_to_motor_ratios]\n\"2\" = 1.0\n",
        CALIBRATED.replace("min = -1.05", "min = 1.1")
    ));
    let rig = rig_with_store(store.clone());
    assert!(!rig.hand.is_calibrated());
    assert_eq!(rig.hand.calibration_state().ratio(2), None);
    assert_eq!(store.snapshot()[KEY_CALIBRATED].as_bool(), Some(false));

    rig.hand.connect();
    let joints = rig.hand.joint_positions().unwrap();
    assert_eq!(joints["index_mcp"], None);
    assert!(joints["thumb_mcp"].is_some());
}

#[test]
fn zero_stored_ratio_fails_build() {
    let store = store_from(&format!("{CALIBRATED}\n[joint_to_motor_ratios]\n\"1\" = 0.0\n"));
    let err = HandBuilder::new()
        .with_bus(NoopBus)
        .with_config(common::config())
        .with_store(store)
        .build()
        .unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Config(m)) if m.contains("non-zero")));
}

#[test]
fn set_max_current_rejects_wrong_length_without_writing() {
    let rig = connected_rig();
    let err = rig.hand.set_max_current(vec![100.0, 100.0]).unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Validation(_))));
    assert_eq!(rig.sim.current_limit(1), Some(0.0));

    rig.hand
        .set_max_current(MaxCurrent::PerMotor(vec![100.0, 150.0, 200.0]))
        .unwrap();
    assert_eq!(rig.sim.current_limit(2), Some(150.0));
    rig.hand.set_max_current(250.0).unwrap();
    assert_eq!(rig.sim.current_limit(3), Some(250.0));
}

#[test]
fn partial_calibration_blocks_joint_command_without_writing() {
    let rig = rig_with_store(store_from(PARTIAL));
    rig.hand.connect();
    rig.hand.enable_torque(None).unwrap();

    let err = rig
        .hand
        .set_joint_positions(&targets(&[("thumb_mcp", 0.5), ("index_mcp", 0.5)]))
        .unwrap_err();
    assert_eq!(
        hand_error(&err),
        Some(&HandError::NotCalibrated {
            motor: 2,
            joint: "index_mcp".into()
        })
    );
    assert_eq!(rig.sim.position_writes(), 0);

    rig.hand
        .set_joint_positions(&targets(&[("thumb_mcp", 0.785)]))
        .unwrap();
    assert_close(rig.sim.position(1).unwrap(), 0.0, 1e-9);
    let joints = rig.hand.joint_positions().unwrap();
    assert_close(joints["thumb_mcp"].unwrap(), 0.785, 1e-9);
    assert_eq!(joints["index_mcp"], None);
}

#[test]
fn unknown_identifiers_are_validation_errors() {
    let rig = connected_rig();
    let err = rig
        .hand
        .set_joint_positions(&targets(&[("pinky", 0.0)]))
        .unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Validation(_))));

    let err = rig.hand.enable_torque(Some(&[1, 9][..])).unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Validation(m)) if m.contains("9")));
    assert_eq!(rig.sim.torque_enabled(1), Some(false));
}

#[test]
fn control_mode_by_name() {
    let rig = connected_rig();
    rig.hand.set_control_mode_named("position", Some(&[2][..])).unwrap();
    assert_eq!(rig.sim.mode(2), Some(3));
    assert_eq!(rig.sim.mode(1), Some(3));
    rig.hand
        .set_control_mode(ControlMode::CurrentBasedPosition, None)
        .unwrap();
    assert_eq!(rig.sim.mode(1), Some(5));

    let err = rig.hand.set_control_mode_named("servo", None).unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Validation(m)) if m.contains("servo")));
}

#[test]
fn telemetry_reads_follow_bus_order() {
    let rig = connected_rig();
    rig.sim.set_temperature(2, 55.0);
    assert_eq!(
        rig.hand.motor_temperatures().unwrap(),
        vec![30.0, 55.0, 32.0]
    );
    assert_eq!(rig.hand.motor_currents().unwrap(), vec![0.0; 3]);
    assert_eq!(rig.hand.motor_positions().unwrap().len(), 3);
}

#[test]
fn disconnect_releases_torque_and_tolerates_failure() {
    let rig = connected_rig();
    rig.hand.enable_torque(None).unwrap();
    let status = rig.hand.disconnect();
    assert!(status.ok);
    assert_eq!(rig.sim.torque_enabled(1), Some(false));

    rig.hand.connect();
    rig.sim.fail_torque_disable(true);
    let status = rig.hand.disconnect();
    assert!(status.ok, "{}", status.message);
    assert!(!rig.sim.is_connected());
}

#[test]
fn dropping_the_hand_disconnects() {
    let rig = connected_rig();
    let sim = rig.sim.clone();
    drop(rig);
    assert!(!sim.is_connected());
}

#[test]
fn init_joints_skips_calibration_when_calibrated() {
    let mut rig = rig_with_store(store_from(CALIBRATED));
    rig.hand.connect();
    let report = rig.hand.init_joints(false).unwrap();
    assert!(report.is_none());
    assert_eq!(rig.sim.current_limit(1), Some(300.0));
    // every joint at 0: motor at its lower limit plus the ROM offset
    assert_close(rig.sim.position(1).unwrap(), -1.0, 1e-9);
    assert_close(rig.sim.position(3).unwrap(), -1.1, 1e-9);
    let expected = -1.05 + 0.35 * (2.15 / 1.92);
    assert_close(rig.sim.position(2).unwrap(), expected, 1e-9);
}

#[test]
fn init_joints_calibrates_uncalibrated_hand() {
    let mut rig = connected_rig();
    let report = rig.hand.init_joints(false).unwrap();
    assert!(report.is_some_and(|r| r.calibrated));
    assert!(rig.hand.is_calibrated());
}

#[test]
fn calibration_file_with_unknown_motor_fails_build() {
    let store = store_from("[joint_to_motor_ratios]\n\"7\" = 1.0\n");
    let err = HandBuilder::new()
        .with_bus(NoopBus)
        .with_config(common::config())
        .with_store(store)
        .with_clock(TestClock::new())
        .build()
        .unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Config(_))));
}

#[test]
fn config_survives_a_later_bus_swap() {
    let hand = HandBuilder::new()
        .with_config(common::config())
        .with_store(store_from(CALIBRATED))
        .with_bus(NoopBus)
        .build()
        .unwrap();
    assert_eq!(hand.model().motor_ids(), &[1, 2, 3]);
    assert!(hand.is_calibrated());
}

#[test]
fn invalid_config_fails_build() {
    let mut cfg = common::config();
    cfg.max_current = 10.0;
    let err = HandBuilder::new()
        .with_bus(NoopBus)
        .with_config(cfg)
        .with_store(MemoryStore::new())
        .build()
        .unwrap_err();
    assert!(matches!(hand_error(&err), Some(HandError::Config(m)) if m.contains("calibration.current")));
}
