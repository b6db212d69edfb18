//! Joint ↔ motor coordinate transform.
//!
//! Pure functions of the model and the calibration state. Each motor maps
//! affinely onto its joint:
//!
//! ```text
//! joint = rom_min + (motor - limit_min) / ratio
//! motor = limit_min + (joint - rom_min) * ratio
//! ```
//!
//! A joint whose motor lacks either limit has no defined position.

use std::collections::BTreeMap;

use hand_traits::MotorId;

use crate::error::{HandError, Result};
use crate::model::{HandModel, Rom};
use crate::state::CalibrationState;

/// Joint positions keyed by joint id; `None` marks an uncalibrated joint.
pub type JointPositions = BTreeMap<String, Option<f64>>;

/// Calibration data needed to convert one motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCal {
    pub limit_min: f64,
    pub ratio: f64,
    pub rom: Rom,
}

impl MotorCal {
    /// Resolve calibration for `motor`, `None` while incomplete.
    pub fn lookup(model: &HandModel, state: &CalibrationState, motor: MotorId) -> Option<Self> {
        let (limit_min, _) = state.limits(motor).both()?;
        let ratio = state.ratio(motor)?;
        let rom = model.rom(model.joint_for(motor)?)?;
        Some(Self {
            limit_min,
            ratio,
            rom,
        })
    }

    #[inline]
    pub fn to_joint(&self, motor_pos: f64) -> f64 {
        self.rom.min + (motor_pos - self.limit_min) / self.ratio
    }

    #[inline]
    pub fn to_motor(&self, joint_pos: f64) -> f64 {
        self.limit_min + (joint_pos - self.rom.min) * self.ratio
    }
}

/// Convert a bus-ordered motor position vector to joint positions.
pub fn motor_to_joint(
    model: &HandModel,
    state: &CalibrationState,
    motor_positions: &[f64],
) -> Result<JointPositions> {
    if motor_positions.len() != model.motor_count() {
        return Err(HandError::Validation(format!(
            "expected {} motor positions, got {}",
            model.motor_count(),
            motor_positions.len()
        ))
        .into());
    }
    let mut out = JointPositions::new();
    for (slot, motor) in model.motor_ids().iter().enumerate() {
        let Some(joint) = model.joint_for(*motor) else {
            continue;
        };
        let value = MotorCal::lookup(model, state, *motor).map(|c| c.to_joint(motor_positions[slot]));
        out.insert(joint.to_string(), value);
    }
    Ok(out)
}

/// Merge a partial joint command into the present motor positions.
///
/// Unknown joints are rejected with a validation error and joints whose motor
/// is not calibrated with `NotCalibrated`; in either case nothing is returned,
/// so callers never write a half-converted vector.
pub fn joint_to_motor(
    model: &HandModel,
    state: &CalibrationState,
    current: &[f64],
    targets: &BTreeMap<String, f64>,
) -> Result<Vec<f64>> {
    if current.len() != model.motor_count() {
        return Err(HandError::Validation(format!(
            "expected {} motor positions, got {}",
            model.motor_count(),
            current.len()
        ))
        .into());
    }
    let mut out = current.to_vec();
    for (joint, value) in targets {
        let (motor, slot) = model.resolve_joint(joint)?;
        if !value.is_finite() {
            return Err(
                HandError::Validation(format!("joint '{joint}' target must be finite")).into(),
            );
        }
        let cal = MotorCal::lookup(model, state, motor).ok_or_else(|| HandError::NotCalibrated {
            motor,
            joint: joint.clone(),
        })?;
        out[slot] = cal.to_motor(*value);
    }
    Ok(out)
}
