use hand_hardware::{HwError, SimulatedHand};
use hand_traits::{MotorBus, Pose};
use rstest::rstest;

fn connected(ids: &[u8]) -> SimulatedHand {
    let mut sim = SimulatedHand::new(ids);
    sim.connect().expect("connect");
    sim
}

#[test]
fn stalled_motor_draws_its_current_limit() {
    let mut sim = connected(&[1, 2]);
    sim.set_torque_enabled(&[1, 2], true).unwrap();
    sim.write_desired_current(&[1, 2], &[200.0, 200.0]).unwrap();
    // motor 1 pushed past its upper stop, motor 2 held in range
    sim.write_desired_pos(&[1, 2], &[5.0, 0.0]).unwrap();
    let fb = sim.read_pos_vel_cur().unwrap();
    assert_eq!(fb.currents[0], 200.0);
    assert!(fb.currents[1] < 200.0);
}

#[test]
fn jitter_follows_fixed_pattern() {
    let mut sim = SimulatedHand::new(&[1]).with_stops(1, -1.0, 1.0).with_jitter(0.004);
    sim.connect().unwrap();
    let reads: Vec<f64> = (0..3)
        .map(|_| sim.read_pos_vel_cur().unwrap().positions[0])
        .collect();
    assert_eq!(reads, vec![0.0, 0.004, -0.004]);
}

#[rstest]
#[case(Pose::Flexed, 1.0)]
#[case(Pose::Extended, -1.0)]
fn backdrive_reaches_stop(#[case] pose: Pose, #[case] expected: f64) {
    let sim = SimulatedHand::new(&[3]).with_stops(3, -1.0, 1.0);
    let h = sim.handle();
    h.backdrive_to(3, pose);
    assert_eq!(h.position(3), Some(expected));
}

#[test]
fn injected_write_failure_after_budget() {
    let mut sim = connected(&[1]);
    let h = sim.handle();
    h.fail_position_writes_after(1);
    sim.write_desired_pos(&[1], &[0.0]).unwrap();
    let err = sim.write_desired_pos(&[1], &[0.0]).unwrap_err();
    assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Injected(_))));
    assert_eq!(h.position_writes(), 1);
}

#[test]
fn length_mismatch_is_rejected() {
    let mut sim = connected(&[1, 2]);
    let err = sim.write_desired_current(&[1, 2], &[1.0]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::LengthMismatch {
            expected: 2,
            got: 1
        })
    ));
}

#[test]
fn connect_failure_is_reported() {
    let mut sim = SimulatedHand::new(&[1]);
    sim.handle().fail_connect(Some("no such port"));
    let err = sim.connect().unwrap_err();
    assert!(err.to_string().contains("no such port"));
    assert!(!sim.is_connected());
}
