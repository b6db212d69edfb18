use hand_traits::MotorId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("hand is not connected")]
    NotConnected,
    #[error("motor {motor} corresponding to joint {joint} is not calibrated")]
    NotCalibrated { motor: MotorId, joint: String },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error(
        "calibration step {step} timed out after {iterations} iterations; motors still moving: {pending:?}"
    )]
    CalibrationTimeout {
        step: usize,
        pending: Vec<MotorId>,
        iterations: u64,
    },
    #[error("calibration cancelled")]
    Cancelled,
    #[error("motor {motor} (joint {joint}) has identical lower and upper limits")]
    DegenerateLimits { motor: MotorId, joint: String },
    #[error("operator did not acknowledge: {0}")]
    Operator(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Typed view of a report, if it carries a `HandError`.
pub fn hand_error(report: &Report) -> Option<&HandError> {
    report.downcast_ref::<HandError>()
}
