//! `From` implementations bridging `hand_config` types to `hand_core` types.

use std::time::Duration;

use crate::model::{CalibrationBudget, CalibrationParams, CalibrationStep, ControlParams};
use crate::util::secs_to_duration;

// ── CalibrationParams ────────────────────────────────────────────────────────

impl From<&hand_config::CalibrationCfg> for CalibrationParams {
    fn from(c: &hand_config::CalibrationCfg) -> Self {
        Self {
            current: c.current,
            step_size: c.step_size,
            step_period: secs_to_duration(c.step_period),
            threshold: c.threshold,
            num_stable: c.num_stable,
            settle_period: secs_to_duration(c.settle_period),
            budget: CalibrationBudget {
                // 0 disables the limit
                max_iterations: (c.max_iterations > 0).then_some(c.max_iterations),
                max_duration: (c.timeout_ms > 0).then(|| Duration::from_millis(c.timeout_ms)),
            },
            strategy: c.strategy,
            preview_samples: c.preview_samples,
            preview_period: secs_to_duration(c.preview_period),
        }
    }
}

// ── CalibrationStep ──────────────────────────────────────────────────────────

impl From<&hand_config::CalibrationStepCfg> for CalibrationStep {
    fn from(c: &hand_config::CalibrationStepCfg) -> Self {
        Self {
            joints: c.joints.iter().map(|(j, d)| (j.clone(), *d)).collect(),
        }
    }
}

// ── ControlParams ────────────────────────────────────────────────────────────

impl From<&hand_config::Config> for ControlParams {
    fn from(c: &hand_config::Config) -> Self {
        Self {
            port: c.port.clone(),
            baudrate: c.baudrate,
            max_current: c.max_current,
            control_mode: c.control_mode,
        }
    }
}

/// Milliseconds as a `Duration`, with 0 meaning "no limit".
pub fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_fields_disable_limits() {
        let cfg = hand_config::CalibrationCfg::default();
        let p = CalibrationParams::from(&cfg);
        assert_eq!(p.budget, CalibrationBudget::unbounded());
        assert_eq!(p.step_period, Duration::from_millis(10));
        assert_eq!(p.num_stable, 20);
        assert_eq!(optional_millis(1500), Some(Duration::from_millis(1500)));
    }
}
