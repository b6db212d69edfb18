//! Serialized access to the motor bus.
//!
//! Every bus interaction goes through `HardwareGate`, which owns the bus
//! behind a mutex. A caller that needs several operations to happen without
//! interleaving (read positions, add an increment, write) runs them inside one
//! `exclusive` section. The telemetry monitor and the facade share the gate
//! through an `Arc`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use hand_config::ControlMode;
use hand_traits::{Clock, Feedback, MotorBus, MotorId};

use crate::error::{HandError, Result};
use crate::hw_error::map_hw_error;

/// Pause between disabling torque and closing the port.
pub const DISCONNECT_SETTLE: Duration = Duration::from_millis(100);

/// Outcome of a connect or disconnect, reported rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub ok: bool,
    pub message: String,
}

impl LinkStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Position command for a subset of motors; untouched motors keep their
/// present position.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorMove {
    Absolute(BTreeMap<MotorId, f64>),
    Relative(BTreeMap<MotorId, f64>),
}

/// Bus access granted for the duration of one `exclusive` section.
pub struct Channel<'a, B: ?Sized> {
    bus: &'a mut B,
    motor_ids: &'a [MotorId],
}

impl<B: MotorBus + ?Sized> Channel<'_, B> {
    pub fn motor_ids(&self) -> &[MotorId] {
        self.motor_ids
    }

    fn expect_len(&self, what: &str, got: usize) -> Result<()> {
        if got != self.motor_ids.len() {
            return Err(HandError::HardwareFault(format!(
                "bus returned {got} {what} for {} motors",
                self.motor_ids.len()
            ))
            .into());
        }
        Ok(())
    }

    pub fn feedback(&mut self) -> Result<Feedback> {
        let fb = self.bus.read_pos_vel_cur().map_err(|e| map_hw_error(&*e))?;
        self.expect_len("positions", fb.positions.len())?;
        self.expect_len("currents", fb.currents.len())?;
        Ok(fb)
    }

    pub fn positions(&mut self) -> Result<Vec<f64>> {
        Ok(self.feedback()?.positions)
    }

    pub fn temperatures(&mut self) -> Result<Vec<f64>> {
        let t = self.bus.read_temperature().map_err(|e| map_hw_error(&*e))?;
        self.expect_len("temperatures", t.len())?;
        Ok(t)
    }

    /// Write a full position vector, one entry per motor in bus order.
    pub fn write_positions(&mut self, positions: &[f64]) -> Result<()> {
        if positions.len() != self.motor_ids.len() {
            return Err(HandError::Validation(format!(
                "expected {} positions, got {}",
                self.motor_ids.len(),
                positions.len()
            ))
            .into());
        }
        self.bus
            .write_desired_pos(self.motor_ids, positions)
            .map_err(|e| map_hw_error(&*e))?;
        Ok(())
    }

    pub fn write_currents(&mut self, motor_ids: &[MotorId], currents: &[f64]) -> Result<()> {
        self.bus
            .write_desired_current(motor_ids, currents)
            .map_err(|e| map_hw_error(&*e))?;
        Ok(())
    }

    pub fn set_torque(&mut self, motor_ids: &[MotorId], enabled: bool) -> Result<()> {
        self.bus
            .set_torque_enabled(motor_ids, enabled)
            .map_err(|e| map_hw_error(&*e))?;
        Ok(())
    }

    pub fn set_mode(&mut self, motor_ids: &[MotorId], mode: ControlMode) -> Result<()> {
        self.bus
            .set_operating_mode(motor_ids, mode.code())
            .map_err(|e| map_hw_error(&*e))?;
        Ok(())
    }

    /// Read present positions, merge `mv` into them and write the result.
    /// Returns the vector written.
    pub fn apply(&mut self, mv: &MotorMove) -> Result<Vec<f64>> {
        let mut target = self.positions()?;
        let (entries, relative) = match mv {
            MotorMove::Absolute(m) => (m, false),
            MotorMove::Relative(m) => (m, true),
        };
        for (motor, value) in entries {
            let slot = self
                .motor_ids
                .iter()
                .position(|m| m == motor)
                .ok_or_else(|| HandError::Validation(format!("invalid motor id {motor}")))?;
            if relative {
                target[slot] += value;
            } else {
                target[slot] = *value;
            }
        }
        self.write_positions(&target)?;
        Ok(target)
    }
}

pub struct HardwareGate<B> {
    bus: Mutex<B>,
    motor_ids: Vec<MotorId>,
}

impl<B: MotorBus> HardwareGate<B> {
    pub fn new(bus: B, motor_ids: Vec<MotorId>) -> Self {
        Self {
            bus: Mutex::new(bus),
            motor_ids,
        }
    }

    pub fn motor_ids(&self) -> &[MotorId] {
        &self.motor_ids
    }

    fn lock(&self) -> Result<MutexGuard<'_, B>> {
        self.bus
            .lock()
            .map_err(|_| HandError::Hardware("bus lock poisoned".into()).into())
    }

    pub fn connect(&self) -> LinkStatus {
        let mut bus = match self.lock() {
            Ok(b) => b,
            Err(e) => return LinkStatus::failed(format!("Connection failed: {e}")),
        };
        match bus.connect() {
            Ok(()) => {
                tracing::info!(motors = self.motor_ids.len(), "connected to motor bus");
                LinkStatus::ok("Connection successful")
            }
            Err(e) => {
                tracing::error!(error = %e, "connection to motor bus failed");
                LinkStatus::failed(format!("Connection failed: {e}"))
            }
        }
    }

    /// Disable torque (best effort), pause, then close the bus.
    pub fn disconnect(&self, clock: &dyn Clock) -> LinkStatus {
        let mut bus = match self.lock() {
            Ok(b) => b,
            Err(e) => return LinkStatus::failed(format!("Disconnection failed: {e}")),
        };
        if bus.is_connected() {
            if let Err(e) = bus.set_torque_enabled(&self.motor_ids, false) {
                tracing::warn!(error = %e, "failed to disable torque before disconnect");
            }
            clock.sleep(DISCONNECT_SETTLE);
        }
        match bus.disconnect() {
            Ok(()) => {
                tracing::info!("disconnected from motor bus");
                LinkStatus::ok("Disconnected successfully")
            }
            Err(e) => {
                tracing::error!(error = %e, "disconnect failed");
                LinkStatus::failed(format!("Disconnection failed: {e}"))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().map(|b| b.is_connected()).unwrap_or(false)
    }

    /// Run `f` with exclusive bus access. Fails with `NotConnected` before
    /// touching the bus if the link is down.
    pub fn exclusive<T>(&self, f: impl FnOnce(&mut Channel<'_, B>) -> Result<T>) -> Result<T> {
        let mut bus = self.lock()?;
        if !bus.is_connected() {
            return Err(HandError::NotConnected.into());
        }
        let mut channel = Channel {
            bus: &mut *bus,
            motor_ids: &self.motor_ids,
        };
        f(&mut channel)
    }

    pub fn read_feedback(&self) -> Result<Feedback> {
        self.exclusive(|ch| ch.feedback())
    }

    pub fn read_positions(&self) -> Result<Vec<f64>> {
        self.exclusive(|ch| ch.positions())
    }

    pub fn read_temperatures(&self) -> Result<Vec<f64>> {
        self.exclusive(|ch| ch.temperatures())
    }

    pub fn write_positions(&self, positions: &[f64]) -> Result<()> {
        self.exclusive(|ch| ch.write_positions(positions))
    }

    pub fn write_currents(&self, motor_ids: &[MotorId], currents: &[f64]) -> Result<()> {
        self.exclusive(|ch| ch.write_currents(motor_ids, currents))
    }

    pub fn set_torque(&self, motor_ids: &[MotorId], enabled: bool) -> Result<()> {
        self.exclusive(|ch| ch.set_torque(motor_ids, enabled))
    }

    pub fn set_mode(&self, motor_ids: &[MotorId], mode: ControlMode) -> Result<()> {
        self.exclusive(|ch| ch.set_mode(motor_ids, mode))
    }

    pub fn apply(&self, mv: &MotorMove) -> Result<Vec<f64>> {
        self.exclusive(|ch| ch.apply(mv))
    }

    /// Read positions, let `f` compute the full target vector, write it.
    /// Nothing is written if `f` fails.
    pub fn read_modify_write(
        &self,
        f: impl FnOnce(&[f64]) -> Result<Vec<f64>>,
    ) -> Result<Vec<f64>> {
        self.exclusive(|ch| {
            let current = ch.positions()?;
            let target = f(&current)?;
            ch.write_positions(&target)?;
            Ok(target)
        })
    }
}
