//! Mutable calibration state: per-motor limits, derived ratios and the
//! persisted "calibrated" flag.

use std::collections::BTreeMap;
use std::fmt;

use hand_config::{
    CalibrationFile, Direction, KEY_CALIBRATED, KEY_MOTOR_LIMITS, KEY_RATIOS, LimitEntry, Store,
    limits_to_value, ratios_to_value,
};
use hand_traits::MotorId;

use crate::error::{HandError, Result};
use crate::model::{HandModel, Rom};

/// Which end of a motor's travel a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

impl From<Direction> for Bound {
    /// Flexing runs into the upper stop, extending into the lower one.
    fn from(d: Direction) -> Self {
        match d {
            Direction::Flex => Bound::Upper,
            Direction::Extend => Bound::Lower,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bound::Lower => "lower",
            Bound::Upper => "upper",
        })
    }
}

/// Measured motor positions at the two stops; either may be undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimitPair {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl LimitPair {
    pub fn get(&self, bound: Bound) -> Option<f64> {
        match bound {
            Bound::Lower => self.min,
            Bound::Upper => self.max,
        }
    }

    pub fn set(&mut self, bound: Bound, value: f64) {
        match bound {
            Bound::Lower => self.min = Some(value),
            Bound::Upper => self.max = Some(value),
        }
    }

    /// `(min, max)` when both are known.
    pub fn both(&self) -> Option<(f64, f64)> {
        Some((self.min?, self.max?))
    }

    pub fn is_complete(&self) -> bool {
        self.both().is_some()
    }
}

impl From<LimitEntry> for LimitPair {
    fn from(e: LimitEntry) -> Self {
        Self {
            min: e.min,
            max: e.max,
        }
    }
}

impl From<LimitPair> for LimitEntry {
    fn from(p: LimitPair) -> Self {
        Self {
            min: p.min,
            max: p.max,
        }
    }
}

/// Motor radians per joint radian for a measured travel and a joint ROM.
#[inline]
pub fn ratio_for(min: f64, max: f64, rom: Rom) -> f64 {
    (max - min) / rom.width()
}

/// Relative tolerance when comparing a stored ratio against its limits.
const RATIO_TOLERANCE: f64 = 1e-6;

fn ratios_agree(stored: f64, derived: f64) -> bool {
    (stored - derived).abs() <= RATIO_TOLERANCE * derived.abs().max(1.0)
}

#[derive(Debug, Clone, Default)]
pub struct CalibrationState {
    limits: BTreeMap<MotorId, LimitPair>,
    ratios: BTreeMap<MotorId, f64>,
    calibrated: bool,
    version: u64,
}

impl CalibrationState {
    /// Nothing known yet.
    pub fn empty(model: &HandModel) -> Self {
        Self {
            limits: model
                .motor_ids()
                .iter()
                .map(|m| (*m, LimitPair::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Rebuild from a persisted record.
    ///
    /// Ratios are kept only for motors with two distinct limits and are
    /// always derived from those limits and the joint ROM; a stored ratio that
    /// disagrees is logged and replaced.
    pub fn from_file(model: &HandModel, file: &CalibrationFile) -> Result<Self> {
        let mut state = Self::empty(model);
        for (motor, entry) in &file.motor_limits {
            state.limits.insert(*motor, (*entry).into());
        }
        for motor in model.motor_ids() {
            let Some((min, max)) = state.limits(*motor).both() else {
                continue;
            };
            if max == min {
                tracing::warn!(motor, "stored limits are identical; ratio left undefined");
                continue;
            }
            let ratio = ratio_for(min, max, rom_of(model, *motor)?);
            let stored = file.ratios.get(motor).copied();
            if let Some(stored) = stored.filter(|r| !ratios_agree(*r, ratio)) {
                tracing::warn!(
                    motor,
                    stored,
                    derived = ratio,
                    "stored ratio disagrees with limits; using derived ratio"
                );
            }
            state.ratios.insert(*motor, ratio);
        }
        state.calibrated = file.calibrated;
        Ok(state)
    }

    pub fn limits(&self, motor: MotorId) -> LimitPair {
        self.limits.get(&motor).copied().unwrap_or_default()
    }

    pub fn ratio(&self, motor: MotorId) -> Option<f64> {
        self.ratios.get(&motor).copied()
    }

    /// Flag as last recorded; see `is_complete` for the derived truth.
    pub fn flag(&self) -> bool {
        self.calibrated
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Every motor has both limits and a ratio.
    pub fn is_complete(&self, model: &HandModel) -> bool {
        model
            .motor_ids()
            .iter()
            .all(|m| self.limits(*m).is_complete() && self.ratio(*m).is_some())
    }

    /// Motors still missing a limit or a ratio.
    pub fn incomplete_motors(&self, model: &HandModel) -> Vec<MotorId> {
        model
            .motor_ids()
            .iter()
            .copied()
            .filter(|m| !(self.limits(*m).is_complete() && self.ratio(*m).is_some()))
            .collect()
    }

    /// The stored flag claims calibration that the limits do not back up.
    pub fn flag_overclaims(&self, model: &HandModel) -> bool {
        self.calibrated && !self.is_complete(model)
    }

    /// Forget every limit and ratio.
    pub fn reset(&mut self, model: &HandModel) {
        let version = self.version;
        *self = Self::empty(model);
        self.version = version + 1;
    }

    pub fn record(&mut self, motor: MotorId, bound: Bound, value: f64) {
        self.limits.entry(motor).or_default().set(bound, value);
        self.version += 1;
    }

    /// Record a batch of limits and refresh ratios as one change. On error
    /// `self` is left untouched.
    pub fn apply<I>(&mut self, model: &HandModel, samples: I) -> Result<Vec<MotorId>>
    where
        I: IntoIterator<Item = (MotorId, Bound, f64)>,
    {
        let mut staged = self.clone();
        for (motor, bound, value) in samples {
            staged.record(motor, bound, value);
        }
        let ready = staged.refresh_ratios(model)?;
        *self = staged;
        Ok(ready)
    }

    /// Recompute the ratio of every motor with both limits and drop ratios of
    /// the rest. Returns the motors that now have a ratio, in bus order.
    pub fn refresh_ratios(&mut self, model: &HandModel) -> Result<Vec<MotorId>> {
        let mut ready = Vec::new();
        for motor in model.motor_ids() {
            let Some((min, max)) = self.limits(*motor).both() else {
                self.ratios.remove(motor);
                continue;
            };
            let joint = model.joint_for(*motor).unwrap_or_default().to_string();
            if max == min {
                return Err(HandError::DegenerateLimits {
                    motor: *motor,
                    joint,
                }
                .into());
            }
            let ratio = ratio_for(min, max, rom_of(model, *motor)?);
            if ratio < 0.0 {
                tracing::warn!(
                    motor,
                    joint = %joint,
                    min,
                    max,
                    ratio,
                    "lower limit above upper limit; motor direction may be inverted"
                );
            }
            self.ratios.insert(*motor, ratio);
            ready.push(*motor);
        }
        self.version += 1;
        Ok(ready)
    }

    /// Set the flag from the current limits and return it.
    pub fn settle_flag(&mut self, model: &HandModel) -> bool {
        self.calibrated = self.is_complete(model);
        self.version += 1;
        self.calibrated
    }

    pub fn to_file(&self) -> CalibrationFile {
        CalibrationFile {
            calibrated: self.calibrated,
            motor_limits: self.limits.iter().map(|(m, p)| (*m, (*p).into())).collect(),
            ratios: self.ratios.clone(),
        }
    }

    /// Write ratios, then limits.
    pub fn persist_tables(&self, store: &mut dyn Store) -> Result<()> {
        let file = self.to_file();
        store
            .update_key(KEY_RATIOS, ratios_to_value(&file.ratios))
            .map_err(storage)?;
        store
            .update_key(KEY_MOTOR_LIMITS, limits_to_value(&file.motor_limits))
            .map_err(storage)?;
        Ok(())
    }

    pub fn persist_flag(&self, store: &mut dyn Store) -> Result<()> {
        store
            .update_key(KEY_CALIBRATED, toml::Value::Boolean(self.calibrated))
            .map_err(storage)?;
        Ok(())
    }

    /// Align the flag with the limits when it overclaims, persisting the fix.
    pub fn correct_flag(&mut self, model: &HandModel, store: &mut dyn Store) -> Result<bool> {
        if !self.flag_overclaims(model) {
            return Ok(false);
        }
        tracing::warn!(
            missing = ?self.incomplete_motors(model),
            "calibration file claims calibrated but limits are incomplete; clearing flag"
        );
        self.calibrated = false;
        self.version += 1;
        self.persist_flag(store)?;
        Ok(true)
    }
}

fn rom_of(model: &HandModel, motor: MotorId) -> Result<Rom> {
    model
        .joint_for(motor)
        .and_then(|j| model.rom(j))
        .ok_or_else(|| HandError::Config(format!("motor {motor} has no joint ROM")).into())
}

fn storage(e: eyre::Report) -> HandError {
    HandError::Storage(e.to_string())
}
