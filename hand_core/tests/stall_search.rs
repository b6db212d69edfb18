mod common;

use hand_config::MemoryStore;
use hand_core::{
    CalibrationContext, CalibrationState, CancelToken, HandModel, HardwareGate, StallSearch,
    StepPhase,
};
use hand_hardware::SimulatedHand;
use hand_traits::test_clock::TestClock;
use hand_traits::MotorBus;

#[test]
fn single_stepping_walks_the_state_machine() {
    let model = HandModel::from_config(&common::config()).unwrap();
    let mut state = CalibrationState::empty(&model);
    let mut bus = SimulatedHand::new(&[1, 2, 3]).with_stops(1, -0.2, 0.2);
    bus.connect().unwrap();
    bus.set_torque_enabled(&[1, 2, 3], true).unwrap();
    let sim = bus.handle();
    let gate = HardwareGate::new(bus, vec![1, 2, 3]);
    let mut store = MemoryStore::new();
    let clock = TestClock::new();
    let cancel = CancelToken::new();
    let cx = CalibrationContext {
        model: &model,
        state: &mut state,
        gate: &gate,
        store: &mut store,
        clock: &clock,
        cancel: &cancel,
    };

    let step = &model.sequence()[0];
    let mut search = StallSearch::new(0, step);
    assert_eq!(search.phase(), StepPhase::InitStep);
    assert_eq!(search.advance(&cx).unwrap(), StepPhase::Driving);
    assert_eq!(search.pending(), vec![2, 1]);

    assert_eq!(search.advance(&cx).unwrap(), StepPhase::StableCheck);
    assert_eq!(search.iterations(), 1);
    assert_eq!(sim.position(1), Some(0.1));
    assert_eq!(search.advance(&cx).unwrap(), StepPhase::Driving);

    let mut guard = 0;
    while search.phase() != StepPhase::StepDone {
        search.advance(&cx).unwrap();
        guard += 1;
        assert!(guard < 200, "stall search did not converge");
    }
    assert!(search.pending().is_empty());
    let outcome = search.into_outcome();
    let thumb = outcome.samples.iter().find(|s| s.motor == 1).unwrap();
    assert!((thumb.value - 0.2).abs() < 1e-9);
    // the narrow motor settles first
    let index = outcome.samples.iter().find(|s| s.motor == 2).unwrap();
    assert!(thumb.iterations < index.iterations);
    assert_eq!(clock.sleep_count(), outcome.iterations);
}
