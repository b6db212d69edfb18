//! Test and helper mocks for hand_core

use hand_traits::{Feedback, ManualRequest, MotorBus, MotorId, Operator, Pose};

type BusResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A bus that never connects; every operation fails.
pub struct NoopBus;

impl NoopBus {
    fn fail<T>() -> BusResult<T> {
        Err(Box::new(std::io::Error::other("noop bus: not connected")))
    }
}

impl MotorBus for NoopBus {
    fn connect(&mut self) -> BusResult<()> {
        Err(Box::new(std::io::Error::other("noop bus has no port")))
    }
    fn disconnect(&mut self) -> BusResult<()> {
        Ok(())
    }
    fn is_connected(&self) -> bool {
        false
    }
    fn set_torque_enabled(&mut self, _: &[MotorId], _: bool) -> BusResult<()> {
        Self::fail()
    }
    fn set_operating_mode(&mut self, _: &[MotorId], _: u8) -> BusResult<()> {
        Self::fail()
    }
    fn write_desired_current(&mut self, _: &[MotorId], _: &[f64]) -> BusResult<()> {
        Self::fail()
    }
    fn write_desired_pos(&mut self, _: &[MotorId], _: &[f64]) -> BusResult<()> {
        Self::fail()
    }
    fn read_pos_vel_cur(&mut self) -> BusResult<Feedback> {
        Self::fail()
    }
    fn read_temperature(&mut self) -> BusResult<Vec<f64>> {
        Self::fail()
    }
}

/// Operator that acknowledges immediately, running a hook first and keeping
/// a log of every request.
pub struct RecordingOperator<F> {
    hook: F,
    pub requests: Vec<(String, MotorId, Pose)>,
}

impl<F: FnMut(&ManualRequest<'_>)> RecordingOperator<F> {
    pub fn new(hook: F) -> Self {
        Self {
            hook,
            requests: Vec::new(),
        }
    }
}

impl<F: FnMut(&ManualRequest<'_>)> Operator for RecordingOperator<F> {
    fn acknowledge(&mut self, request: &ManualRequest<'_>) -> BusResult<()> {
        (self.hook)(request);
        self.requests
            .push((request.joint.to_string(), request.motor, request.pose));
        Ok(())
    }
}
