use hand_config::{CalibrationStrategy, ControlMode, Direction, load_toml};
use rstest::rstest;

const BASE: &str = r#"
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
index_pip = [0, 1.75]

[calibration]
current = 200.0
step_size = 0.1
step_period = 0.01
threshold = 0.01
num_stable = 20

[[calibration.sequence]]
joints = { index_pip = "extend", index_mcp = "extend" }

[[calibration.sequence]]
joints = { index_pip = "flex", thumb_mcp = "flex" }
"#;

fn base() -> hand_config::Config {
    load_toml(BASE).expect("parse TOML")
}

#[test]
fn accepts_valid_config_and_fills_defaults() {
    let cfg = base();
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.baudrate, 3_000_000);
    assert_eq!(cfg.port, "/dev/ttyUSB0");
    assert_eq!(cfg.control_mode, ControlMode::CurrentBasedPosition);
    assert_eq!(cfg.calibration.strategy, CalibrationStrategy::Auto);
    assert_eq!(cfg.calibration.sequence.len(), 2);
    assert_eq!(
        cfg.calibration.sequence[0].joints.get("index_pip"),
        Some(&Direction::Extend)
    );
    // integer literal in a ROM array still reads as a float
    assert_eq!(cfg.joint_roms["index_pip"], [0.0, 1.75]);
}

#[test]
fn shipped_example_config_is_valid() {
    let text = include_str!("../../etc/hand_config.toml");
    let cfg = load_toml(text).expect("parse shipped config");
    cfg.validate().expect("shipped config valid");
}

#[test]
fn rejects_unknown_control_mode_at_parse() {
    let text = BASE.replace("current_based_position", "current_position");
    assert!(load_toml(&text).is_err());
}

#[test]
fn rejects_unknown_direction_at_parse() {
    let text = BASE.replace(r#"thumb_mcp = "flex""#, r#"thumb_mcp = "curl""#);
    assert!(load_toml(&text).is_err());
}

fn expect_invalid(cfg: hand_config::Config, needle: &str) {
    let err = cfg.validate().expect_err("config should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'");
}

#[rstest]
#[case::count_mismatch(|c: &mut hand_config::Config| { c.motor_ids.push(4); }, "do not match")]
#[case::duplicate_motor(|c: &mut hand_config::Config| { c.motor_ids[2] = 1; }, "duplicates")]
#[case::map_unknown_motor(|c: &mut hand_config::Config| { c.joint_to_motor_map.insert("index_pip".into(), 9); }, "not in motor_ids")]
#[case::map_not_injective(|c: &mut hand_config::Config| { c.joint_to_motor_map.insert("index_pip".into(), 2); }, "more than one joint")]
#[case::map_unknown_joint(|c: &mut hand_config::Config| {
    c.joint_to_motor_map.remove("index_pip");
    c.joint_to_motor_map.insert("pinky".into(), 3);
}, "joint pinky is not defined")]
#[case::missing_rom(|c: &mut hand_config::Config| { c.joint_roms.remove("thumb_mcp"); }, "ROM for joint thumb_mcp")]
#[case::zero_width_rom(|c: &mut hand_config::Config| { c.joint_roms.insert("thumb_mcp".into(), [1.0, 1.0]); }, "max > min")]
#[case::rom_for_unknown_joint(|c: &mut hand_config::Config| { c.joint_roms.insert("pinky".into(), [0.0, 1.0]); }, "joint pinky")]
#[case::current_below_calibration(|c: &mut hand_config::Config| { c.max_current = 100.0; }, "calibration.current")]
#[case::zero_num_stable(|c: &mut hand_config::Config| { c.calibration.num_stable = 0; }, "num_stable")]
#[case::zero_step(|c: &mut hand_config::Config| { c.calibration.step_size = 0.0; }, "step_size")]
#[case::negative_threshold(|c: &mut hand_config::Config| { c.calibration.threshold = -0.1; }, "threshold")]
#[case::sequence_unknown_joint(|c: &mut hand_config::Config| {
    c.calibration.sequence[1].joints.insert("pinky".into(), Direction::Flex);
}, "sequence[1]")]
#[case::bad_rotation(|c: &mut hand_config::Config| { c.logging.rotation = Some("weekly".into()); }, "logging.rotation")]
fn rejects_inconsistent_configs(
    #[case] mutate: fn(&mut hand_config::Config),
    #[case] needle: &str,
) {
    let mut cfg = base();
    mutate(&mut cfg);
    expect_invalid(cfg, needle);
}
