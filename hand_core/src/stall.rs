//! Automatic limit search by stall detection.
//!
//! Each step drives its motors in small relative increments under a reduced
//! current limit. A motor pressed against its mechanical stop stops moving;
//! once its last `num_stable` samples agree within `threshold`, the mean of
//! that window is taken as the limit.
//!
//! The loop is an explicit state machine (`StallSearch::advance`) so a test
//! can single-step it, and every pause goes through the injected clock.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use hand_config::{ControlMode, Direction};
use hand_traits::{Feedback, MotorBus, MotorId};

use crate::calibration::{
    CalibrationContext, LimitSample, LimitStrategy, MotorTrace, StepOutcome,
};
use crate::error::{HandError, Result};
use crate::gate::MotorMove;
use crate::model::CalibrationStep;

/// Bounded window of recent positions.
#[derive(Debug, Clone)]
pub struct StabilityBuffer {
    window: VecDeque<f64>,
    capacity: usize,
    threshold: f64,
}

impl StabilityBuffer {
    pub fn new(capacity: usize, threshold: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
        }
    }

    pub fn push(&mut self, x: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(x);
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    /// Full, and every value within `threshold` of the oldest one.
    pub fn is_stable(&self) -> bool {
        let Some(first) = self.window.front() else {
            return false;
        };
        self.is_full() && self.window.iter().all(|x| (x - first).abs() <= self.threshold)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }

    /// Push `x`; the window mean once stable.
    pub fn observe(&mut self, x: f64) -> Option<f64> {
        self.push(x);
        if self.is_stable() { self.mean() } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    InitStep,
    Driving,
    StableCheck,
    StepDone,
}

#[derive(Debug)]
struct Probe {
    motor: MotorId,
    slot: usize,
    joint: String,
    direction: Direction,
    buffer: StabilityBuffer,
    trace: MotorTrace,
    limit: Option<f64>,
    settled_after: u64,
}

/// Stall search for one calibration step.
#[derive(Debug)]
pub struct StallSearch {
    index: usize,
    step: CalibrationStep,
    phase: StepPhase,
    probes: Vec<Probe>,
    iterations: u64,
    started: Option<Instant>,
    sample: Option<Feedback>,
}

impl StallSearch {
    /// `index` is the 0-based position of `step` in the sequence.
    pub fn new(index: usize, step: &CalibrationStep) -> Self {
        Self {
            index,
            step: step.clone(),
            phase: StepPhase::InitStep,
            probes: Vec::new(),
            iterations: 0,
            started: None,
            sample: None,
        }
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Motors still searching for their limit.
    pub fn pending(&self) -> Vec<MotorId> {
        self.probes
            .iter()
            .filter(|p| p.limit.is_none())
            .map(|p| p.motor)
            .collect()
    }

    /// Perform one state transition and return the new phase.
    pub fn advance<B: MotorBus>(&mut self, cx: &CalibrationContext<'_, B>) -> Result<StepPhase> {
        self.phase = match self.phase {
            StepPhase::InitStep => self.init(cx)?,
            StepPhase::Driving => self.drive(cx)?,
            StepPhase::StableCheck => self.check(),
            StepPhase::StepDone => StepPhase::StepDone,
        };
        Ok(self.phase)
    }

    /// Advance until the step is done.
    pub fn run<B: MotorBus>(mut self, cx: &CalibrationContext<'_, B>) -> Result<StepOutcome> {
        while self.advance(cx)? != StepPhase::StepDone {}
        Ok(self.into_outcome())
    }

    fn init<B: MotorBus>(&mut self, cx: &CalibrationContext<'_, B>) -> Result<StepPhase> {
        let params = cx.model.calibration();
        for (joint, direction) in &self.step.joints {
            let (motor, slot) = cx.model.resolve_joint(joint)?;
            self.probes.push(Probe {
                motor,
                slot,
                joint: joint.clone(),
                direction: *direction,
                buffer: StabilityBuffer::new(params.num_stable, params.threshold),
                trace: MotorTrace::default(),
                limit: None,
                settled_after: 0,
            });
        }
        self.started = Some(cx.clock.now());
        Ok(if self.probes.is_empty() {
            StepPhase::StepDone
        } else {
            StepPhase::Driving
        })
    }

    fn drive<B: MotorBus>(&mut self, cx: &CalibrationContext<'_, B>) -> Result<StepPhase> {
        cx.cancel.check()?;
        let params = cx.model.calibration();
        let elapsed = self
            .started
            .map(|t| cx.clock.elapsed_since(t))
            .unwrap_or_default();
        if params.budget.exhausted(self.iterations, elapsed) {
            let pending = self.pending();
            tracing::error!(
                step = self.index + 1,
                iterations = self.iterations,
                ?pending,
                "stall search exceeded its budget"
            );
            return Err(HandError::CalibrationTimeout {
                step: self.index + 1,
                pending,
                iterations: self.iterations,
            }
            .into());
        }

        let increments: BTreeMap<MotorId, f64> = self
            .probes
            .iter()
            .filter(|p| p.limit.is_none())
            .map(|p| (p.motor, p.direction.sign() * params.step_size))
            .collect();
        cx.gate.apply(&MotorMove::Relative(increments))?;
        cx.clock.sleep(params.step_period);
        self.sample = Some(cx.gate.read_feedback()?);
        self.iterations += 1;
        Ok(StepPhase::StableCheck)
    }

    fn check(&mut self) -> StepPhase {
        let Some(fb) = self.sample.take() else {
            return StepPhase::Driving;
        };
        for probe in self.probes.iter_mut().filter(|p| p.limit.is_none()) {
            let pos = fb.positions[probe.slot];
            probe.trace.positions.push(pos);
            probe.trace.currents.push(fb.currents[probe.slot]);
            if let Some(limit) = probe.buffer.observe(pos) {
                probe.limit = Some(limit);
                probe.settled_after = self.iterations;
                tracing::info!(
                    motor = probe.motor,
                    joint = %probe.joint,
                    direction = %probe.direction,
                    limit,
                    iterations = self.iterations,
                    "Motor {} corresponding to joint {} reached the limit at {:.4} rad",
                    probe.motor,
                    probe.joint,
                    limit
                );
            }
        }
        if self.probes.iter().all(|p| p.limit.is_some()) {
            StepPhase::StepDone
        } else {
            StepPhase::Driving
        }
    }

    pub fn into_outcome(self) -> StepOutcome {
        let mut outcome = StepOutcome {
            iterations: self.iterations,
            ..StepOutcome::default()
        };
        for p in self.probes {
            if let Some(value) = p.limit {
                outcome.samples.push(LimitSample {
                    motor: p.motor,
                    joint: p.joint,
                    bound: p.direction.into(),
                    value,
                    iterations: p.settled_after,
                });
            }
            outcome.traces.insert(p.motor, p.trace);
        }
        outcome
    }
}

/// Automatic strategy: drive under reduced current until stall.
#[derive(Debug, Default)]
pub struct StallDetection;

impl StallDetection {
    pub fn new() -> Self {
        Self
    }
}

impl<B: MotorBus> LimitStrategy<B> for StallDetection {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn starts_fresh(&self) -> bool {
        true
    }

    fn begin(&mut self, cx: &mut CalibrationContext<'_, B>) -> Result<()> {
        let ids = cx.model.motor_ids();
        cx.gate.set_mode(ids, ControlMode::CurrentBasedPosition)?;
        cx.set_uniform_current(cx.model.calibration().current)?;
        cx.gate.set_torque(ids, true)?;
        Ok(())
    }

    fn sample_step(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        index: usize,
        step: &CalibrationStep,
    ) -> Result<StepOutcome> {
        StallSearch::new(index, step).run(cx)
    }

    fn after_step(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        zero_pose: &BTreeMap<String, f64>,
    ) -> Result<()> {
        cx.move_joints(zero_pose)?;
        cx.clock.sleep(cx.model.calibration().settle_period);
        Ok(())
    }

    fn finish(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        zero_pose: &BTreeMap<String, f64>,
    ) -> Result<()> {
        cx.move_joints(zero_pose)?;
        cx.set_uniform_current(cx.model.control().max_current)
    }
}
