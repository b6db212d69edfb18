#![allow(dead_code)]

use hand_config::{Config, MemoryStore, load_toml};
use hand_core::{Hand, HandBuilder};
use hand_hardware::{SimHandle, SimulatedHand};
use hand_traits::test_clock::TestClock;

pub const CONFIG: &str = r#"
max_current = 300.0
control_mode = "current_based_position"
motor_ids = [1, 2, 3]
joint_ids = ["thumb_mcp", "index_mcp", "index_pip"]

[joint_to_motor_map]
thumb_mcp = 1
index_mcp = 2
index_pip = 3

[joint_roms]
thumb_mcp = [0.0, 1.57]
index_mcp = [-0.35, 1.57]
index_pip = [0.0, 1.75]

[calibration]
current = 200.0
step_size = 0.1
step_period = 0.01
threshold = 0.01
num_stable = 3
settle_period = 1.0

[[calibration.sequence]]
joints = { thumb_mcp = "flex", index_mcp = "flex" }

[[calibration.sequence]]
joints = { thumb_mcp = "extend", index_mcp = "extend", index_pip = "flex" }

[[calibration.sequence]]
joints = { index_pip = "extend" }
"#;

/// Simulated stops, in motor order: (-1.0, 1.0), (-1.05, 1.1), (-1.1, 1.2).
pub const STOPS: [(f64, f64); 3] = [(-1.0, 1.0), (-1.05, 1.1), (-1.1, 1.2)];
pub const ROMS: [(f64, f64); 3] = [(0.0, 1.57), (-0.35, 1.57), (0.0, 1.75)];

pub fn config() -> Config {
    load_toml(CONFIG).expect("test config parses")
}

pub fn sim() -> (SimulatedHand, SimHandle) {
    let sim = SimulatedHand::new(&[1, 2, 3]);
    let handle = sim.handle();
    (sim, handle)
}

pub struct Rig {
    pub hand: Hand<SimulatedHand>,
    pub sim: SimHandle,
    pub store: MemoryStore,
    pub clock: TestClock,
}

/// Hand over a simulated bus with a shared in-memory store and a test clock.
pub fn rig_with_store(store: MemoryStore) -> Rig {
    let (bus, sim) = sim();
    let clock = TestClock::new();
    let hand = HandBuilder::new()
        .with_bus(bus)
        .with_config(config())
        .with_store(store.clone())
        .with_clock(clock.clone())
        .build()
        .expect("build hand");
    Rig {
        hand,
        sim,
        store,
        clock,
    }
}

pub fn rig() -> Rig {
    rig_with_store(MemoryStore::new())
}

/// Same as `rig`, already connected.
pub fn connected_rig() -> Rig {
    let rig = rig();
    let status = rig.hand.connect();
    assert!(status.ok, "{}", status.message);
    rig
}

pub fn store_from(text: &str) -> MemoryStore {
    MemoryStore::with_table(text.parse::<toml::Table>().expect("valid toml"))
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected} ± {tol}, got {actual}"
    );
}
