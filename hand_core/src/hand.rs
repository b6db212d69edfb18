//! `Hand`: the public controller.
//!
//! Composes the model, the calibration state, the hardware gate and the
//! calibration store. All motor I/O goes through the gate; every change to
//! the calibration state is persisted through the store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hand_config::{ControlMode, Store};
use hand_traits::{Clock, MotorBus, MotorId, Operator};

use crate::calibration::{self, CalibrationContext, CalibrationReport, CancelToken, LimitStrategy};
use crate::error::{HandError, Result};
use crate::gate::{HardwareGate, LinkStatus};
use crate::manual::ManualCalibration;
use crate::model::{CalibrationBudget, HandModel};
use crate::monitor::TelemetryMonitor;
use crate::stall::StallDetection;
use crate::state::CalibrationState;
use crate::transform::{self, JointPositions};

/// Current limit for `Hand::set_max_current`.
#[derive(Debug, Clone, PartialEq)]
pub enum MaxCurrent {
    Uniform(f64),
    /// One value per motor, in bus order.
    PerMotor(Vec<f64>),
}

impl From<f64> for MaxCurrent {
    fn from(v: f64) -> Self {
        MaxCurrent::Uniform(v)
    }
}

impl From<Vec<f64>> for MaxCurrent {
    fn from(v: Vec<f64>) -> Self {
        MaxCurrent::PerMotor(v)
    }
}

impl From<&[f64]> for MaxCurrent {
    fn from(v: &[f64]) -> Self {
        MaxCurrent::PerMotor(v.to_vec())
    }
}

pub struct Hand<B: MotorBus> {
    pub(crate) model: HandModel,
    pub(crate) state: CalibrationState,
    pub(crate) gate: Arc<HardwareGate<B>>,
    pub(crate) store: Box<dyn Store>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) cancel: CancelToken,
}

impl<B: MotorBus> core::fmt::Debug for Hand<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hand")
            .field("motors", &self.model.motor_ids())
            .field("calibrated", &self.state.is_complete(&self.model))
            .field("connected", &self.gate.is_connected())
            .finish()
    }
}

impl<B: MotorBus> Hand<B> {
    pub fn model(&self) -> &HandModel {
        &self.model
    }

    pub fn calibration_state(&self) -> &CalibrationState {
        &self.state
    }

    /// Token that aborts a running calibration from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ── Link ─────────────────────────────────────────────────────────────────

    pub fn connect(&self) -> LinkStatus {
        self.gate.connect()
    }

    pub fn disconnect(&self) -> LinkStatus {
        self.gate.disconnect(&*self.clock)
    }

    pub fn is_connected(&self) -> bool {
        self.gate.is_connected()
    }

    // ── Motor settings ───────────────────────────────────────────────────────

    /// Enable torque on `motors`, or on every motor when `None`.
    pub fn enable_torque(&self, motors: Option<&[MotorId]>) -> Result<()> {
        let ids = self.model.select_motors(motors)?;
        self.gate.set_torque(&ids, true)
    }

    pub fn disable_torque(&self, motors: Option<&[MotorId]>) -> Result<()> {
        let ids = self.model.select_motors(motors)?;
        self.gate.set_torque(&ids, false)
    }

    pub fn set_control_mode(&self, mode: ControlMode, motors: Option<&[MotorId]>) -> Result<()> {
        let ids = self.model.select_motors(motors)?;
        self.gate.set_mode(&ids, mode)?;
        tracing::info!(%mode, motors = ?ids, "control mode set");
        Ok(())
    }

    /// Like `set_control_mode`, taking the mode by name.
    pub fn set_control_mode_named(&self, mode: &str, motors: Option<&[MotorId]>) -> Result<()> {
        let mode: ControlMode = mode
            .parse()
            .map_err(|e: eyre::Report| HandError::Validation(e.to_string()))?;
        self.set_control_mode(mode, motors)
    }

    /// Set the current limit of every motor. A per-motor vector must have one
    /// entry per motor; nothing is written otherwise.
    pub fn set_max_current(&self, current: impl Into<MaxCurrent>) -> Result<()> {
        let n = self.model.motor_count();
        let currents = match current.into() {
            MaxCurrent::Uniform(c) => vec![c; n],
            MaxCurrent::PerMotor(v) => {
                if v.len() != n {
                    return Err(HandError::Validation(format!(
                        "expected {n} current values, got {}",
                        v.len()
                    ))
                    .into());
                }
                v
            }
        };
        if let Some(bad) = currents.iter().find(|c| !c.is_finite() || **c < 0.0) {
            return Err(HandError::Validation(format!("invalid current limit {bad}")).into());
        }
        self.gate.write_currents(self.model.motor_ids(), &currents)
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    pub fn motor_positions(&self) -> Result<Vec<f64>> {
        self.gate.read_positions()
    }

    pub fn motor_currents(&self) -> Result<Vec<f64>> {
        Ok(self.gate.read_feedback()?.currents)
    }

    pub fn motor_temperatures(&self) -> Result<Vec<f64>> {
        self.gate.read_temperatures()
    }

    /// Background reader of temperatures and positions, sharing the gate.
    pub fn monitor(&self, period: Duration) -> TelemetryMonitor
    where
        B: Send + 'static,
    {
        TelemetryMonitor::spawn(self.gate.clone(), period, self.clock.clone())
    }

    // ── Joint space ──────────────────────────────────────────────────────────

    /// Present joint positions; `None` for joints whose motor is uncalibrated.
    pub fn joint_positions(&self) -> Result<JointPositions> {
        let motors = self.gate.read_positions()?;
        transform::motor_to_joint(&self.model, &self.state, &motors)
    }

    /// Command a subset of joints. The read of present positions and the write
    /// happen in one gate section; a bad joint aborts before any write.
    pub fn set_joint_positions(&self, targets: &BTreeMap<String, f64>) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let (model, state) = (&self.model, &self.state);
        let written = self
            .gate
            .read_modify_write(|current| transform::joint_to_motor(model, state, current, targets))?;
        tracing::debug!(?targets, motors = ?written, "joint positions set");
        Ok(())
    }

    /// Every joint at 0.
    pub fn zero_pose(&self) -> BTreeMap<String, f64> {
        self.model
            .joint_ids()
            .iter()
            .map(|j| (j.clone(), 0.0))
            .collect()
    }

    // ── Calibration ──────────────────────────────────────────────────────────

    /// True iff every motor has both limits; never read from the stored flag.
    pub fn is_calibrated(&self) -> bool {
        self.state.is_complete(&self.model)
    }

    /// Per-run override of the stall-search budget.
    pub fn set_calibration_budget(&mut self, budget: CalibrationBudget) {
        self.model.calibration_mut().budget = budget;
    }

    /// Automatic calibration by stall detection.
    pub fn calibrate(&mut self) -> Result<CalibrationReport> {
        self.calibrate_with(&mut StallDetection::new())
    }

    /// Operator-guided calibration.
    pub fn calibrate_manual(&mut self, operator: &mut dyn Operator) -> Result<CalibrationReport> {
        self.calibrate_with(&mut ManualCalibration::new(operator))
    }

    pub fn calibrate_with<S: LimitStrategy<B> + ?Sized>(
        &mut self,
        strategy: &mut S,
    ) -> Result<CalibrationReport> {
        let mut cx = CalibrationContext {
            model: &self.model,
            state: &mut self.state,
            gate: &self.gate,
            store: self.store.as_mut(),
            clock: self.clock.as_ref(),
            cancel: &self.cancel,
        };
        let result = calibration::run(&mut cx, strategy);
        // a cancellation applies to one run only
        self.cancel.reset();
        result
    }

    /// Bring the hand to a known pose: torque on, configured mode and current,
    /// calibrate when needed (or when `force`), then zero every joint.
    pub fn init_joints(&mut self, force: bool) -> Result<Option<CalibrationReport>> {
        let control = self.model.control().clone();
        self.enable_torque(None)?;
        self.set_control_mode(control.control_mode, None)?;
        self.set_max_current(control.max_current)?;
        let report = if force || !self.is_calibrated() {
            Some(self.calibrate()?)
        } else {
            None
        };
        self.set_joint_positions(&self.zero_pose())?;
        Ok(report)
    }
}

impl<B: MotorBus> Drop for Hand<B> {
    fn drop(&mut self) {
        if self.gate.is_connected() {
            let status = self.gate.disconnect(&*self.clock);
            if !status.ok {
                tracing::warn!(message = %status.message, "disconnect on drop failed");
            }
        }
    }
}
