//! Operator-guided calibration.
//!
//! Torque is released so the hand moves freely. For each joint of each step
//! the operator holds the joint fully flexed, then fully extended; the motor
//! position at each acknowledgment becomes the upper and lower limit. Results
//! are persisted after every joint, followed by a short live readout so the
//! operator can check the new mapping.

use std::collections::BTreeMap;
use std::time::Duration;

use hand_traits::{ManualRequest, MotorBus, Operator, Pose};

use crate::calibration::{CalibrationContext, LimitSample, LimitStrategy, StepOutcome};
use crate::error::{HandError, Result};
use crate::model::CalibrationStep;
use crate::state::Bound;
use crate::transform::motor_to_joint;

/// Seconds counted down before the hand re-centres under torque.
pub const COUNTDOWN_SECS: u64 = 3;

pub struct ManualCalibration<'o> {
    operator: &'o mut dyn Operator,
}

impl<'o> ManualCalibration<'o> {
    pub fn new(operator: &'o mut dyn Operator) -> Self {
        Self { operator }
    }

    fn preview<B: MotorBus>(&self, cx: &CalibrationContext<'_, B>, joint: &str) -> Result<()> {
        let params = cx.model.calibration();
        for _ in 0..params.preview_samples {
            let motors = cx.gate.read_positions()?;
            let joints = motor_to_joint(cx.model, &*cx.state, &motors)?;
            tracing::info!(
                joint,
                position = ?joints.get(joint).copied().flatten(),
                ?motors,
                "live readout"
            );
            cx.clock.sleep(params.preview_period);
        }
        Ok(())
    }
}

impl<B: MotorBus> LimitStrategy<B> for ManualCalibration<'_> {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn starts_fresh(&self) -> bool {
        false
    }

    fn begin(&mut self, cx: &mut CalibrationContext<'_, B>) -> Result<()> {
        cx.gate.set_torque(cx.model.motor_ids(), false)?;
        tracing::info!("torque released; move each joint by hand when asked");
        Ok(())
    }

    fn sample_step(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        index: usize,
        step: &CalibrationStep,
    ) -> Result<StepOutcome> {
        let steps = cx.model.sequence().len();
        let mut outcome = StepOutcome::default();
        for (joint, _) in &step.joints {
            let (motor, slot) = cx.model.resolve_joint(joint)?;
            let mut samples = Vec::with_capacity(2);
            for pose in [Pose::Flexed, Pose::Extended] {
                cx.cancel.check()?;
                let request = ManualRequest {
                    joint,
                    motor,
                    pose,
                    step: index + 1,
                    steps,
                };
                self.operator
                    .acknowledge(&request)
                    .map_err(|e| HandError::Operator(e.to_string()))?;
                let value = cx.gate.read_positions()?[slot];
                let bound = match pose {
                    Pose::Flexed => Bound::Upper,
                    Pose::Extended => Bound::Lower,
                };
                tracing::info!(motor, joint = %joint, %bound, value, "limit recorded");
                samples.push(LimitSample {
                    motor,
                    joint: joint.clone(),
                    bound,
                    value,
                    iterations: 0,
                });
            }
            cx.commit(&samples)?;
            tracing::info!(
                motor,
                joint = %joint,
                limits = ?cx.state.limits(motor),
                ratio = ?cx.state.ratio(motor),
                "Joint {joint} calibrated"
            );
            self.preview(cx, joint)?;
            outcome.samples.extend(samples);
        }
        Ok(outcome)
    }

    fn after_step(
        &mut self,
        _cx: &mut CalibrationContext<'_, B>,
        _zero_pose: &BTreeMap<String, f64>,
    ) -> Result<()> {
        Ok(())
    }

    fn finish(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        zero_pose: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let ids = cx.model.motor_ids();
        cx.gate.set_torque(ids, true)?;
        for remaining in (1..=COUNTDOWN_SECS).rev() {
            tracing::warn!(remaining, "releasing hand: joints will move to zero");
            cx.clock.sleep(Duration::from_secs(1));
        }
        cx.move_joints(zero_pose)?;
        cx.clock.sleep(cx.model.calibration().settle_period);
        cx.set_uniform_current(cx.model.control().max_current)
    }
}
