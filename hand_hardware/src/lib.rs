//! Simulated hand hardware.
//!
//! `SimulatedHand` implements `MotorBus` for a set of tendon motors, each
//! bounded by a pair of mechanical stops. With torque on, a position command
//! moves the motor until it hits a stop and stays there; with torque off the
//! motor only moves when back-driven through a `SimHandle`. Faults can be
//! injected to exercise error paths.
pub mod error;

use std::sync::{Arc, Mutex, MutexGuard};

use hand_traits::{Feedback, MotorBus, MotorId, Pose};

pub use error::HwError;

type BusResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone)]
struct SimMotor {
    id: MotorId,
    position: f64,
    goal: f64,
    stop_min: f64,
    stop_max: f64,
    torque: bool,
    mode: u8,
    current_limit: f64,
    temperature: f64,
}

impl SimMotor {
    fn stalled(&self) -> bool {
        self.torque && (self.goal > self.stop_max || self.goal < self.stop_min)
    }
}

#[derive(Debug, Default)]
struct SimState {
    motors: Vec<SimMotor>,
    connected: bool,
    fail_connect: Option<String>,
    fail_torque_disable: bool,
    /// Remaining successful position writes before the next one fails.
    position_writes_left: Option<u64>,
    jitter: f64,
    reads: u64,
    position_writes: u64,
    last_written: Option<Vec<f64>>,
}

impl SimState {
    fn require_connected(&self) -> Result<(), HwError> {
        if self.connected {
            Ok(())
        } else {
            Err(HwError::NotConnected)
        }
    }

    fn motor_mut(&mut self, id: MotorId) -> Result<&mut SimMotor, HwError> {
        self.motors
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(HwError::UnknownMotor(id))
    }

    fn check_len(expected: usize, got: usize) -> Result<(), HwError> {
        if expected == got {
            Ok(())
        } else {
            Err(HwError::LengthMismatch { expected, got })
        }
    }
}

/// Default stop layout: motor `i` travels from `-1.0 - 0.05 i` to `1.0 + 0.1 i`.
fn default_stops(index: usize) -> (f64, f64) {
    let i = index as f64;
    (-1.0 - 0.05 * i, 1.0 + 0.1 * i)
}

/// Simulated motor bus.
pub struct SimulatedHand {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedHand {
    pub fn new(motor_ids: &[MotorId]) -> Self {
        let motors = motor_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let (stop_min, stop_max) = default_stops(i);
                let mid = 0.5 * (stop_min + stop_max);
                SimMotor {
                    id,
                    position: mid,
                    goal: mid,
                    stop_min,
                    stop_max,
                    torque: false,
                    mode: 3,
                    current_limit: 0.0,
                    temperature: 30.0 + i as f64,
                }
            })
            .collect();
        Self {
            shared: Arc::new(Mutex::new(SimState {
                motors,
                ..SimState::default()
            })),
        }
    }

    /// Override the mechanical stops of one motor; the motor is re-centred.
    pub fn with_stops(self, id: MotorId, min: f64, max: f64) -> Self {
        if let Ok(mut st) = self.shared.lock()
            && let Ok(m) = st.motor_mut(id)
        {
            m.stop_min = min;
            m.stop_max = max;
            m.position = 0.5 * (min + max);
            m.goal = m.position;
        }
        self
    }

    /// Add a deterministic read noise pattern `[0, +a, -a]` to positions.
    pub fn with_jitter(self, amplitude: f64) -> Self {
        if let Ok(mut st) = self.shared.lock() {
            st.jitter = amplitude;
        }
        self
    }

    /// Inspection and fault-injection handle sharing this hand's state.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: self.shared.clone(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>, HwError> {
        self.shared
            .lock()
            .map_err(|_| HwError::Port("simulation state poisoned".into()))
    }
}

impl MotorBus for SimulatedHand {
    fn connect(&mut self) -> BusResult<()> {
        let mut st = self.state()?;
        if let Some(reason) = st.fail_connect.clone() {
            return Err(Box::new(HwError::Port(reason)));
        }
        st.connected = true;
        tracing::debug!(motors = st.motors.len(), "simulated bus connected");
        Ok(())
    }

    fn disconnect(&mut self) -> BusResult<()> {
        let mut st = self.state()?;
        st.connected = false;
        tracing::debug!("simulated bus disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.lock().map(|st| st.connected).unwrap_or(false)
    }

    fn set_torque_enabled(&mut self, motor_ids: &[MotorId], enabled: bool) -> BusResult<()> {
        let mut st = self.state()?;
        st.require_connected()?;
        if !enabled && st.fail_torque_disable {
            return Err(Box::new(HwError::Injected("torque disable failed".into())));
        }
        for &id in motor_ids {
            let m = st.motor_mut(id)?;
            if enabled && !m.torque {
                // hold where it is
                m.goal = m.position;
            }
            m.torque = enabled;
        }
        Ok(())
    }

    fn set_operating_mode(&mut self, motor_ids: &[MotorId], mode: u8) -> BusResult<()> {
        let mut st = self.state()?;
        st.require_connected()?;
        for &id in motor_ids {
            st.motor_mut(id)?.mode = mode;
        }
        Ok(())
    }

    fn write_desired_current(&mut self, motor_ids: &[MotorId], currents: &[f64]) -> BusResult<()> {
        let mut st = self.state()?;
        st.require_connected()?;
        SimState::check_len(motor_ids.len(), currents.len())?;
        for (&id, &c) in motor_ids.iter().zip(currents) {
            st.motor_mut(id)?.current_limit = c;
        }
        Ok(())
    }

    fn write_desired_pos(&mut self, motor_ids: &[MotorId], positions: &[f64]) -> BusResult<()> {
        let mut st = self.state()?;
        st.require_connected()?;
        SimState::check_len(motor_ids.len(), positions.len())?;
        if let Some(left) = st.position_writes_left {
            if left == 0 {
                return Err(Box::new(HwError::Injected("position write failed".into())));
            }
            st.position_writes_left = Some(left - 1);
        }
        for (&id, &p) in motor_ids.iter().zip(positions) {
            let m = st.motor_mut(id)?;
            m.goal = p;
            if m.torque {
                m.position = p.clamp(m.stop_min, m.stop_max);
            }
        }
        st.position_writes += 1;
        st.last_written = Some(positions.to_vec());
        tracing::trace!(?positions, "simulated position write");
        Ok(())
    }

    fn read_pos_vel_cur(&mut self) -> BusResult<Feedback> {
        let mut st = self.state()?;
        st.require_connected()?;
        let reads = st.reads;
        st.reads += 1;
        let pattern = [0.0, 1.0, -1.0];
        let jitter = st.jitter;
        let positions = st
            .motors
            .iter()
            .enumerate()
            .map(|(i, m)| m.position + jitter * pattern[(reads as usize + i) % 3])
            .collect();
        let currents = st
            .motors
            .iter()
            .map(|m| {
                if m.stalled() {
                    m.current_limit
                } else if m.torque {
                    0.1 * m.current_limit
                } else {
                    0.0
                }
            })
            .collect();
        Ok(Feedback {
            positions,
            velocities: vec![0.0; st.motors.len()],
            currents,
        })
    }

    fn read_temperature(&mut self) -> BusResult<Vec<f64>> {
        let st = self.state()?;
        st.require_connected()?;
        Ok(st.motors.iter().map(|m| m.temperature).collect())
    }
}

/// Shared view into a `SimulatedHand`, used by tests and the CLI operator.
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> Option<T> {
        self.shared.lock().ok().map(|mut st| f(&mut st))
    }

    fn with_motor<T>(&self, id: MotorId, f: impl FnOnce(&mut SimMotor) -> T) -> Option<T> {
        self.with(|st| st.motor_mut(id).ok().map(f)).flatten()
    }

    pub fn is_connected(&self) -> bool {
        self.with(|st| st.connected).unwrap_or(false)
    }

    /// True position without read noise.
    pub fn position(&self, id: MotorId) -> Option<f64> {
        self.with_motor(id, |m| m.position)
    }

    pub fn stops(&self, id: MotorId) -> Option<(f64, f64)> {
        self.with_motor(id, |m| (m.stop_min, m.stop_max))
    }

    pub fn torque_enabled(&self, id: MotorId) -> Option<bool> {
        self.with_motor(id, |m| m.torque)
    }

    pub fn mode(&self, id: MotorId) -> Option<u8> {
        self.with_motor(id, |m| m.mode)
    }

    pub fn current_limit(&self, id: MotorId) -> Option<f64> {
        self.with_motor(id, |m| m.current_limit)
    }

    pub fn set_temperature(&self, id: MotorId, celsius: f64) {
        self.with_motor(id, |m| m.temperature = celsius);
    }

    /// Move a motor by hand, clamped to its stops.
    pub fn backdrive(&self, id: MotorId, position: f64) {
        self.with_motor(id, |m| {
            m.position = position.clamp(m.stop_min, m.stop_max);
            m.goal = m.position;
        });
    }

    /// Push a motor against the stop matching `pose` (flexed = upper stop).
    pub fn backdrive_to(&self, id: MotorId, pose: Pose) {
        self.with_motor(id, |m| {
            m.position = match pose {
                Pose::Flexed => m.stop_max,
                Pose::Extended => m.stop_min,
            };
            m.goal = m.position;
        });
    }

    /// Number of successful position writes.
    pub fn position_writes(&self) -> u64 {
        self.with(|st| st.position_writes).unwrap_or(0)
    }

    pub fn last_written(&self) -> Option<Vec<f64>> {
        self.with(|st| st.last_written.clone()).flatten()
    }

    pub fn fail_connect(&self, reason: Option<&str>) {
        self.with(|st| st.fail_connect = reason.map(str::to_string));
    }

    pub fn fail_torque_disable(&self, fail: bool) {
        self.with(|st| st.fail_torque_disable = fail);
    }

    /// Let `n` more position writes succeed, then fail every following one.
    pub fn fail_position_writes_after(&self, n: u64) {
        self.with(|st| st.position_writes_left = Some(n));
    }
}
