//! Boundary traits for the hand controller.
//!
//! - `MotorBus`: the motor transport (Dynamixel-style bus or a simulation).
//! - `Operator`: a human acknowledging poses during manual calibration.
//! - `Clock`: time source for every deliberate pause.
//!
//! Implementations report failures as `Box<dyn Error + Send + Sync>`; the core
//! maps them to its typed error enum.

pub mod clock;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "test-clock"))]
pub use clock::test_clock;

/// Motor identifier on the bus.
pub type MotorId = u8;

/// One synchronous read of present position, velocity and current.
///
/// Each vector is aligned with the motor order the bus was opened with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feedback {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub currents: Vec<f64>,
}

pub trait MotorBus {
    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn is_connected(&self) -> bool;

    fn set_torque_enabled(
        &mut self,
        motor_ids: &[MotorId],
        enabled: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// `mode` is the device operating-mode code (0 current, 1 velocity,
    /// 3 position, 4 multi-turn position, 5 current-based position).
    fn set_operating_mode(
        &mut self,
        motor_ids: &[MotorId],
        mode: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn write_desired_current(
        &mut self,
        motor_ids: &[MotorId],
        currents: &[f64],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Positions in radians, one per entry of `motor_ids`.
    fn write_desired_pos(
        &mut self,
        motor_ids: &[MotorId],
        positions: &[f64],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn read_pos_vel_cur(&mut self) -> Result<Feedback, Box<dyn std::error::Error + Send + Sync>>;

    fn read_temperature(&mut self) -> Result<Vec<f64>, Box<dyn std::error::Error + Send + Sync>>;
}

impl<B: MotorBus + ?Sized> MotorBus for Box<B> {
    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).connect()
    }
    fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).disconnect()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn set_torque_enabled(
        &mut self,
        motor_ids: &[MotorId],
        enabled: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_torque_enabled(motor_ids, enabled)
    }
    fn set_operating_mode(
        &mut self,
        motor_ids: &[MotorId],
        mode: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_operating_mode(motor_ids, mode)
    }
    fn write_desired_current(
        &mut self,
        motor_ids: &[MotorId],
        currents: &[f64],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_desired_current(motor_ids, currents)
    }
    fn write_desired_pos(
        &mut self,
        motor_ids: &[MotorId],
        positions: &[f64],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_desired_pos(motor_ids, positions)
    }
    fn read_pos_vel_cur(&mut self) -> Result<Feedback, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_pos_vel_cur()
    }
    fn read_temperature(&mut self) -> Result<Vec<f64>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_temperature()
    }
}

/// Pose the operator is asked to hold a joint in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pose {
    Flexed,
    Extended,
}

/// What the operator is asked to do before acknowledging.
#[derive(Debug, Clone)]
pub struct ManualRequest<'a> {
    pub joint: &'a str,
    pub motor: MotorId,
    pub pose: Pose,
    /// 1-based index of the calibration step and total number of steps.
    pub step: usize,
    pub steps: usize,
}

pub trait Operator {
    /// Block until the operator confirms the joint is held in `request.pose`.
    fn acknowledge(
        &mut self,
        request: &ManualRequest<'_>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> Operator for F
where
    F: FnMut(&ManualRequest<'_>) -> Result<(), Box<dyn std::error::Error + Send + Sync>>,
{
    fn acknowledge(
        &mut self,
        request: &ManualRequest<'_>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self(request)
    }
}
