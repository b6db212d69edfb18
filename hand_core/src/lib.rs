#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hand controller core (hardware-agnostic).
//!
//! Joint-space control of a tendon-driven hand whose joints are each moved by
//! one motor. All hardware interaction goes through `hand_traits::MotorBus`,
//! serialized by a `HardwareGate`.
//!
//! ## Architecture
//!
//! - **Model**: validated identifiers, joint/motor map, ROMs, calibration sequence (`model`)
//! - **State**: per-motor limits, ratios and the calibrated flag (`state`)
//! - **Transform**: affine joint ↔ motor conversion (`transform`)
//! - **Calibration**: stall detection (`stall`) and operator-guided (`manual`)
//!   strategies sharing one engine (`calibration`)
//! - **Facade**: `Hand`, assembled by `HandBuilder`
//! - **Telemetry**: background monitor sharing the gate (`monitor`)

pub mod builder;
pub mod calibration;
pub mod conversions;
pub mod error;
pub mod gate;
pub mod hand;
pub mod hw_error;
pub mod manual;
pub mod mocks;
pub mod model;
pub mod monitor;
pub mod stall;
pub mod state;
pub mod transform;
pub mod util;

pub use builder::{HandBuilder, Missing, NoBus, Set};
pub use calibration::{
    CalibrationContext, CalibrationReport, CancelToken, LimitSample, LimitStrategy, MotorTrace,
    StepOutcome, StepReport,
};
pub use error::{HandError, Report, Result, hand_error};
pub use gate::{HardwareGate, LinkStatus, MotorMove};
pub use hand::{Hand, MaxCurrent};
pub use manual::ManualCalibration;
pub use model::{CalibrationBudget, CalibrationParams, CalibrationStep, HandModel, Rom};
pub use monitor::{Telemetry, TelemetryMonitor};
pub use stall::{StabilityBuffer, StallDetection, StallSearch, StepPhase};
pub use state::{Bound, CalibrationState, LimitPair};
pub use transform::{JointPositions, MotorCal, joint_to_motor, motor_to_joint};

pub use hand_config::{CalibrationStrategy, ControlMode, Direction};
