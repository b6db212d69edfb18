use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("bus not connected")]
    NotConnected,
    #[error("port error: {0}")]
    Port(String),
    #[error("unknown motor id {0}")]
    UnknownMotor(u8),
    #[error("length mismatch: expected {expected} values, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("injected fault: {0}")]
    Injected(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
