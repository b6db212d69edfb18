//! Validated, read-only description of the hand.
//!
//! `HandModel` is built once from a `hand_config::Config` and never mutated:
//! identifiers, the joint/motor bijection, ranges of motion and the
//! calibration sequence. Anything that changes at runtime lives in
//! `CalibrationState`.

use std::collections::BTreeMap;
use std::time::Duration;

use hand_config::{CalibrationStrategy, Config, ControlMode, Direction};
use hand_traits::MotorId;

use crate::error::{HandError, Result};

/// Physical range of motion of a joint, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rom {
    pub min: f64,
    pub max: f64,
}

impl Rom {
    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// One calibration step: joints searched together and the direction each is driven.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationStep {
    pub joints: Vec<(String, Direction)>,
}

/// Upper bound on a single calibration step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationBudget {
    pub max_iterations: Option<u64>,
    pub max_duration: Option<Duration>,
}

impl CalibrationBudget {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// True once either limit has been reached.
    pub fn exhausted(&self, iterations: u64, elapsed: Duration) -> bool {
        self.max_iterations.is_some_and(|max| iterations >= max)
            || self.max_duration.is_some_and(|max| elapsed >= max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParams {
    /// Current limit applied to every motor during the stall search.
    pub current: f64,
    /// Radians added per iteration.
    pub step_size: f64,
    pub step_period: Duration,
    /// Stability tolerance in radians.
    pub threshold: f64,
    /// Consecutive samples required to declare a stall.
    pub num_stable: usize,
    /// Pause after re-centring calibrated joints between steps.
    pub settle_period: Duration,
    pub budget: CalibrationBudget,
    pub strategy: CalibrationStrategy,
    /// Live readouts shown after each manually calibrated joint.
    pub preview_samples: u32,
    pub preview_period: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlParams {
    pub port: String,
    pub baudrate: u32,
    pub max_current: f64,
    pub control_mode: ControlMode,
}

#[derive(Debug, Clone)]
pub struct HandModel {
    motor_ids: Vec<MotorId>,
    joint_ids: Vec<String>,
    joint_to_motor: BTreeMap<String, MotorId>,
    motor_to_joint: BTreeMap<MotorId, String>,
    roms: BTreeMap<String, Rom>,
    sequence: Vec<CalibrationStep>,
    control: ControlParams,
    calibration: CalibrationParams,
}

impl HandModel {
    /// Validate `cfg` and freeze it into a model.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        cfg.validate()
            .map_err(|e| HandError::Config(e.to_string()))?;

        let joint_to_motor = cfg.joint_to_motor_map.clone();
        let motor_to_joint = joint_to_motor
            .iter()
            .map(|(j, m)| (*m, j.clone()))
            .collect();
        let roms = cfg
            .joint_roms
            .iter()
            .map(|(j, [min, max])| (j.clone(), Rom { min: *min, max: *max }))
            .collect();

        Ok(Self {
            motor_ids: cfg.motor_ids.clone(),
            joint_ids: cfg.joint_ids.clone(),
            joint_to_motor,
            motor_to_joint,
            roms,
            sequence: cfg.calibration.sequence.iter().map(Into::into).collect(),
            control: cfg.into(),
            calibration: (&cfg.calibration).into(),
        })
    }

    pub fn motor_ids(&self) -> &[MotorId] {
        &self.motor_ids
    }

    pub fn joint_ids(&self) -> &[String] {
        &self.joint_ids
    }

    pub fn motor_count(&self) -> usize {
        self.motor_ids.len()
    }

    pub fn motor_for(&self, joint: &str) -> Option<MotorId> {
        self.joint_to_motor.get(joint).copied()
    }

    pub fn joint_for(&self, motor: MotorId) -> Option<&str> {
        self.motor_to_joint.get(&motor).map(String::as_str)
    }

    pub fn rom(&self, joint: &str) -> Option<Rom> {
        self.roms.get(joint).copied()
    }

    /// Slot of `motor` in bus-ordered position vectors.
    pub fn motor_index(&self, motor: MotorId) -> Option<usize> {
        self.motor_ids.iter().position(|m| *m == motor)
    }

    pub fn sequence(&self) -> &[CalibrationStep] {
        &self.sequence
    }

    pub fn control(&self) -> &ControlParams {
        &self.control
    }

    pub fn calibration(&self) -> &CalibrationParams {
        &self.calibration
    }

    /// Mutable calibration parameters, for per-run overrides such as a budget.
    pub fn calibration_mut(&mut self) -> &mut CalibrationParams {
        &mut self.calibration
    }

    /// Motor and bus slot for a joint, or a validation error naming the joint.
    pub fn resolve_joint(&self, joint: &str) -> Result<(MotorId, usize)> {
        let motor = self
            .motor_for(joint)
            .ok_or_else(|| HandError::Validation(format!("unknown joint '{joint}'")))?;
        let slot = self
            .motor_index(motor)
            .ok_or_else(|| HandError::Validation(format!("motor {motor} is not on the bus")))?;
        Ok((motor, slot))
    }

    /// Resolve an optional subset of motors; `None` means all motors.
    pub fn select_motors(&self, motors: Option<&[MotorId]>) -> Result<Vec<MotorId>> {
        match motors {
            None => Ok(self.motor_ids.clone()),
            Some(ids) => {
                if let Some(bad) = ids.iter().find(|id| !self.motor_ids.contains(id)) {
                    return Err(HandError::Validation(format!(
                        "invalid motor id {bad}; known motors are {:?}",
                        self.motor_ids
                    ))
                    .into());
                }
                Ok(ids.to_vec())
            }
        }
    }
}
