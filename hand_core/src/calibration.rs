//! Calibration engine shared by the automatic and manual strategies.
//!
//! A `LimitStrategy` produces limit samples for one step at a time; the
//! engine records them, derives ratios, persists the ratio and limit tables
//! after every step and settles the `calibrated` flag at the end. Either
//! strategy therefore leaves identical calibration tables behind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hand_config::Store;
use hand_traits::{Clock, MotorBus, MotorId};

use crate::error::{HandError, Result};
use crate::gate::HardwareGate;
use crate::model::{CalibrationStep, HandModel};
use crate::state::{Bound, CalibrationState};
use crate::transform;

/// Cooperative cancellation flag; clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(HandError::Cancelled.into());
        }
        Ok(())
    }
}

/// One measured limit.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitSample {
    pub motor: MotorId,
    pub joint: String,
    pub bound: Bound,
    pub value: f64,
    /// Drive iterations it took to settle; 0 for operator-acknowledged samples.
    pub iterations: u64,
}

/// Sampled positions and currents of one motor during a stall search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorTrace {
    pub positions: Vec<f64>,
    pub currents: Vec<f64>,
}

/// What a strategy hands back for one step.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub samples: Vec<LimitSample>,
    pub traces: BTreeMap<MotorId, MotorTrace>,
    pub iterations: u64,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based step number.
    pub step: usize,
    pub samples: Vec<LimitSample>,
    pub traces: BTreeMap<MotorId, MotorTrace>,
    pub iterations: u64,
    /// Motors with both limits known after this step.
    pub ready: Vec<MotorId>,
}

#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub strategy: &'static str,
    pub steps: Vec<StepReport>,
    pub calibrated: bool,
    /// Final ratio table.
    pub ratios: BTreeMap<MotorId, f64>,
}

/// Everything a strategy may touch while calibrating.
pub struct CalibrationContext<'a, B> {
    pub model: &'a HandModel,
    pub state: &'a mut CalibrationState,
    pub gate: &'a HardwareGate<B>,
    pub store: &'a mut dyn Store,
    pub clock: &'a (dyn Clock + Send + Sync),
    pub cancel: &'a CancelToken,
}

impl<B: MotorBus> CalibrationContext<'_, B> {
    /// Command joints through the transform, leaving other motors in place.
    pub fn move_joints(&self, targets: &BTreeMap<String, f64>) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let (model, state) = (self.model, &*self.state);
        self.gate
            .read_modify_write(|current| transform::joint_to_motor(model, state, current, targets))?;
        Ok(())
    }

    /// Same current limit on every motor.
    pub fn set_uniform_current(&self, current: f64) -> Result<()> {
        let ids = self.model.motor_ids();
        self.gate.write_currents(ids, &vec![current; ids.len()])
    }

    /// Record, refresh ratios and persist. Nothing changes in memory or in
    /// the store when the new limits are degenerate. Used by strategies that want
    /// durability finer than one step.
    pub fn commit(&mut self, samples: &[LimitSample]) -> Result<Vec<MotorId>> {
        let ready = self
            .state
            .apply(self.model, samples.iter().map(|s| (s.motor, s.bound, s.value)))?;
        self.state.persist_tables(self.store)?;
        Ok(ready)
    }
}

/// Source of limit samples.
pub trait LimitStrategy<B: MotorBus> {
    fn name(&self) -> &'static str;

    /// Discard every stored limit before the first step.
    fn starts_fresh(&self) -> bool;

    fn begin(&mut self, cx: &mut CalibrationContext<'_, B>) -> Result<()>;

    /// Produce the limits of every joint in `step`; `index` is 0-based.
    fn sample_step(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        index: usize,
        step: &CalibrationStep,
    ) -> Result<StepOutcome>;

    /// Called after the step's results are persisted with the joints whose
    /// motors are fully calibrated, each mapped to 0.
    fn after_step(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        zero_pose: &BTreeMap<String, f64>,
    ) -> Result<()>;

    fn finish(
        &mut self,
        cx: &mut CalibrationContext<'_, B>,
        zero_pose: &BTreeMap<String, f64>,
    ) -> Result<()>;
}

/// Run every step of the model's sequence with `strategy`.
///
/// Errors propagate unchanged; whatever was persisted at the last completed
/// step boundary stays persisted.
pub fn run<B, S>(cx: &mut CalibrationContext<'_, B>, strategy: &mut S) -> Result<CalibrationReport>
where
    B: MotorBus,
    S: LimitStrategy<B> + ?Sized,
{
    let model = cx.model;
    let steps = model.sequence();
    tracing::info!(
        strategy = strategy.name(),
        steps = steps.len(),
        "calibration started"
    );
    cx.cancel.check()?;

    if strategy.starts_fresh() {
        cx.state.reset(model);
    }
    strategy.begin(cx)?;

    let mut zero_pose = BTreeMap::new();
    let mut reports = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        tracing::info!(step = index + 1, of = steps.len(), joints = ?step.joints, "calibration step");
        let outcome = strategy.sample_step(cx, index, step)?;
        let ready = cx.commit(&outcome.samples)?;
        zero_pose = ready
            .iter()
            .filter_map(|m| model.joint_for(*m))
            .map(|j| (j.to_string(), 0.0))
            .collect();
        tracing::info!(
            step = index + 1,
            calibrated_motors = ?ready,
            "calibration step persisted"
        );
        strategy.after_step(cx, &zero_pose)?;
        reports.push(StepReport {
            step: index + 1,
            samples: outcome.samples,
            traces: outcome.traces,
            iterations: outcome.iterations,
            ready,
        });
    }

    let calibrated = cx.state.settle_flag(model);
    cx.state.persist_flag(cx.store)?;
    if calibrated {
        tracing::info!("calibration complete: hand is calibrated");
    } else {
        tracing::warn!(
            missing = ?cx.state.incomplete_motors(model),
            "calibration finished but the hand is not fully calibrated"
        );
    }
    strategy.finish(cx, &zero_pose)?;

    let ratios = model
        .motor_ids()
        .iter()
        .filter_map(|m| cx.state.ratio(*m).map(|r| (*m, r)))
        .collect();
    Ok(CalibrationReport {
        strategy: strategy.name(),
        steps: reports,
        calibrated,
        ratios,
    })
}
