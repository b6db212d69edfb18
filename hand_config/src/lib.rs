#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration-file parsing for the hand controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `CalibrationFile` is the mutable calibration record (limits, ratios,
//!   `calibrated` flag); motor keys are checked against the declared motors.
//! - `store` provides the key-value persistence used to flush calibration
//!   progress.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub mod store;

pub use store::{MemoryStore, Store, TomlFileStore, read_structured, update_key};

/// Drive direction of a joint during a calibration step.
///
/// Increasing motor position flexes the joint, so `Flex` drives towards the
/// upper motor limit and `Extend` towards the lower one.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Flex,
    Extend,
}

impl Direction {
    /// +1 for flex, -1 for extend.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Flex => 1.0,
            Direction::Extend => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Flex => "flex",
            Direction::Extend => "extend",
        })
    }
}

/// Motor operating modes understood by the transport.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Current,
    Velocity,
    Position,
    MultiTurnPosition,
    #[default]
    CurrentBasedPosition,
}

impl ControlMode {
    pub const ALL: [ControlMode; 5] = [
        ControlMode::Current,
        ControlMode::Velocity,
        ControlMode::Position,
        ControlMode::MultiTurnPosition,
        ControlMode::CurrentBasedPosition,
    ];

    /// Device operating-mode code.
    pub fn code(self) -> u8 {
        match self {
            ControlMode::Current => 0,
            ControlMode::Velocity => 1,
            ControlMode::Position => 3,
            ControlMode::MultiTurnPosition => 4,
            ControlMode::CurrentBasedPosition => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Current => "current",
            ControlMode::Velocity => "velocity",
            ControlMode::Position => "position",
            ControlMode::MultiTurnPosition => "multi_turn_position",
            ControlMode::CurrentBasedPosition => "current_based_position",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                eyre::eyre!("invalid control mode '{s}' (expected one of {})", names.join(", "))
            })
    }
}

/// Where calibration limit samples come from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStrategy {
    /// Drive each motor until it stalls against its mechanical stop.
    #[default]
    Auto,
    /// Torque off; an operator holds each pose and acknowledges.
    Manual,
}

/// One entry of the calibration sequence: joints driven together.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CalibrationStepCfg {
    pub joints: BTreeMap<String, Direction>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Current limit applied while searching for stalls (device units).
    pub current: f64,
    /// Relative position increment per iteration (rad).
    pub step_size: f64,
    /// Pause after each increment before sampling (s).
    pub step_period: f64,
    /// Absolute tolerance for the stability test (rad).
    pub threshold: f64,
    /// Stability window length (samples).
    pub num_stable: usize,
    /// Pause after re-zeroing the joints of a finished step (s).
    pub settle_period: f64,
    /// Iteration budget per step; 0 keeps the search unbounded.
    pub max_iterations: u64,
    /// Wall-clock budget per step in ms; 0 keeps the search unbounded.
    pub timeout_ms: u64,
    pub strategy: CalibrationStrategy,
    /// Manual variant: live readouts shown after each joint.
    pub preview_samples: u32,
    /// Manual variant: pause between live readouts (s).
    pub preview_period: f64,
    pub sequence: Vec<CalibrationStepCfg>,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            current: 200.0,
            step_size: 0.1,
            step_period: 0.01,
            threshold: 0.01,
            num_stable: 20,
            settle_period: 1.0,
            max_iterations: 0,
            timeout_ms: 0,
            strategy: CalibrationStrategy::Auto,
            preview_samples: 5,
            preview_period: 1.0,
            sequence: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

fn default_baudrate() -> u32 {
    3_000_000
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_max_current() -> f64 {
    300.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_port")]
    pub port: String,
    /// Operating current limit (device units).
    #[serde(default = "default_max_current")]
    pub max_current: f64,
    #[serde(default)]
    pub control_mode: ControlMode,
    pub motor_ids: Vec<u8>,
    pub joint_ids: Vec<String>,
    pub joint_to_motor_map: BTreeMap<String, u8>,
    /// Range of motion per joint: [min, max] in radians.
    pub joint_roms: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_config(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Identifiers
        if self.motor_ids.is_empty() {
            eyre::bail!("motor_ids must not be empty");
        }
        if self.motor_ids.len() != self.joint_ids.len() {
            eyre::bail!(
                "number of motor_ids ({}) and joint_ids ({}) do not match",
                self.motor_ids.len(),
                self.joint_ids.len()
            );
        }
        let motors: BTreeSet<u8> = self.motor_ids.iter().copied().collect();
        if motors.len() != self.motor_ids.len() {
            eyre::bail!("motor_ids contains duplicates");
        }
        let joints: BTreeSet<&str> = self.joint_ids.iter().map(String::as_str).collect();
        if joints.len() != self.joint_ids.len() {
            eyre::bail!("joint_ids contains duplicates");
        }

        // joint_to_motor_map must be a bijection joint_ids <-> motor_ids
        if self.joint_to_motor_map.len() != self.motor_ids.len() {
            eyre::bail!(
                "joint_to_motor_map has {} entries, expected one per motor ({})",
                self.joint_to_motor_map.len(),
                self.motor_ids.len()
            );
        }
        let mut mapped = BTreeSet::new();
        for (joint, motor) in &self.joint_to_motor_map {
            if !joints.contains(joint.as_str()) {
                eyre::bail!("joint_to_motor_map: joint {joint} is not defined in joint_ids");
            }
            if !motors.contains(motor) {
                eyre::bail!("joint_to_motor_map: motor {motor} is not in motor_ids");
            }
            if !mapped.insert(*motor) {
                eyre::bail!("joint_to_motor_map: motor {motor} is mapped to more than one joint");
            }
        }

        // ROMs
        for joint in &self.joint_ids {
            if !self.joint_roms.contains_key(joint) {
                eyre::bail!("joint_roms: ROM for joint {joint} is not defined");
            }
        }
        for (joint, [lo, hi]) in &self.joint_roms {
            if !joints.contains(joint.as_str()) {
                eyre::bail!("joint_roms: joint {joint} is not defined in joint_ids");
            }
            if !lo.is_finite() || !hi.is_finite() {
                eyre::bail!("joint_roms.{joint} must be finite");
            }
            if hi - lo <= 0.0 {
                eyre::bail!("joint_roms.{joint} must have max > min");
            }
        }

        // Currents
        if !(self.max_current.is_finite() && self.max_current > 0.0) {
            eyre::bail!("max_current must be > 0");
        }
        if self.max_current < self.calibration.current {
            eyre::bail!("max_current must be >= calibration.current");
        }
        if self.baudrate == 0 {
            eyre::bail!("baudrate must be > 0");
        }

        // Calibration
        let c = &self.calibration;
        if !(c.current.is_finite() && c.current > 0.0) {
            eyre::bail!("calibration.current must be > 0");
        }
        if !(c.step_size.is_finite() && c.step_size > 0.0) {
            eyre::bail!("calibration.step_size must be > 0");
        }
        if !(c.step_period.is_finite() && c.step_period >= 0.0) {
            eyre::bail!("calibration.step_period must be >= 0");
        }
        if !(c.threshold.is_finite() && c.threshold > 0.0) {
            eyre::bail!("calibration.threshold must be > 0");
        }
        if c.num_stable == 0 {
            eyre::bail!("calibration.num_stable must be >= 1");
        }
        if !(c.settle_period.is_finite() && c.settle_period >= 0.0) {
            eyre::bail!("calibration.settle_period must be >= 0");
        }
        if !(c.preview_period.is_finite() && c.preview_period >= 0.0) {
            eyre::bail!("calibration.preview_period must be >= 0");
        }
        for (i, step) in c.sequence.iter().enumerate() {
            if step.joints.is_empty() {
                eyre::bail!("calibration.sequence[{i}] has no joints");
            }
            for joint in step.joints.keys() {
                if !joints.contains(joint.as_str()) {
                    eyre::bail!("calibration.sequence[{i}]: joint {joint} is not defined");
                }
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

/// Persisted limit pair for one motor; an absent bound is undefined.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct LimitEntry {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawCalibrationFile {
    calibrated: bool,
    motor_limits: BTreeMap<String, LimitEntry>,
    joint_to_motor_ratios: BTreeMap<String, f64>,
}

/// Calibration file keys.
pub const KEY_CALIBRATED: &str = "calibrated";
pub const KEY_MOTOR_LIMITS: &str = "motor_limits";
pub const KEY_RATIOS: &str = "joint_to_motor_ratios";

/// Mutable calibration record as stored on disk, keyed by motor id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationFile {
    pub calibrated: bool,
    pub motor_limits: BTreeMap<u8, LimitEntry>,
    pub ratios: BTreeMap<u8, f64>,
}

impl CalibrationFile {
    /// Parse a structured table, rejecting motors not in `motor_ids`,
    /// non-finite values and zero ratios.
    pub fn from_table(table: toml::Table, motor_ids: &[u8]) -> eyre::Result<Self> {
        let raw: RawCalibrationFile = toml::Value::Table(table)
            .try_into()
            .map_err(|e| eyre::eyre!("invalid calibration file: {e}"))?;

        let parse_id = |key: &str, section: &str| -> eyre::Result<u8> {
            let id: u8 = key
                .trim()
                .parse()
                .map_err(|_| eyre::eyre!("{section}: '{key}' is not a motor id"))?;
            if !motor_ids.contains(&id) {
                eyre::bail!("{section}: motor {id} is not in motor_ids");
            }
            Ok(id)
        };

        let mut motor_limits = BTreeMap::new();
        for (key, entry) in raw.motor_limits {
            let id = parse_id(&key, KEY_MOTOR_LIMITS)?;
            for v in [entry.min, entry.max].into_iter().flatten() {
                if !v.is_finite() {
                    eyre::bail!("{KEY_MOTOR_LIMITS}.{id} must be finite");
                }
            }
            motor_limits.insert(id, entry);
        }

        let mut ratios = BTreeMap::new();
        for (key, ratio) in raw.joint_to_motor_ratios {
            let id = parse_id(&key, KEY_RATIOS)?;
            if !ratio.is_finite() {
                eyre::bail!("{KEY_RATIOS}.{id} must be finite");
            }
            if ratio == 0.0 {
                eyre::bail!("{KEY_RATIOS}.{id} must be non-zero");
            }
            ratios.insert(id, ratio);
        }

        Ok(Self {
            calibrated: raw.calibrated,
            motor_limits,
            ratios,
        })
    }

    /// Load through a `Store`; a missing file yields an empty record.
    pub fn load(store: &dyn Store, motor_ids: &[u8]) -> eyre::Result<Self> {
        Self::from_table(store.read_structured()?, motor_ids)
    }
}

/// Encode limits as `{ "<id>" = { min = .., max = .. } }`, dropping undefined bounds.
pub fn limits_to_value(limits: &BTreeMap<u8, LimitEntry>) -> toml::Value {
    let mut out = toml::Table::new();
    for (id, entry) in limits {
        let mut t = toml::Table::new();
        if let Some(min) = entry.min {
            t.insert("min".into(), toml::Value::Float(min));
        }
        if let Some(max) = entry.max {
            t.insert("max".into(), toml::Value::Float(max));
        }
        out.insert(id.to_string(), toml::Value::Table(t));
    }
    toml::Value::Table(out)
}

/// Encode ratios as `{ "<id>" = ratio }`.
pub fn ratios_to_value(ratios: &BTreeMap<u8, f64>) -> toml::Value {
    let out: toml::Table = ratios
        .iter()
        .map(|(id, r)| (id.to_string(), toml::Value::Float(*r)))
        .collect();
    toml::Value::Table(out)
}
