//! Background telemetry reader.
//!
//! Spawns a thread that periodically reads positions and temperatures through
//! the shared `HardwareGate`, so its reads never interleave with a command
//! from the control thread. The latest sample is exposed via a bounded
//! channel; the thread is shut down and joined when the monitor is dropped.
use crossbeam_channel as xch;
use hand_traits::{Clock, MotorBus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::gate::HardwareGate;

#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub positions: Vec<f64>,
    pub temperatures: Vec<f64>,
    /// Milliseconds since the monitor started.
    pub at_ms: u64,
}

pub struct TelemetryMonitor {
    rx: xch::Receiver<Telemetry>,
    last_ok: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TelemetryMonitor {
    pub fn spawn<B: MotorBus + Send + 'static>(
        gate: Arc<HardwareGate<B>>,
        period: Duration,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let (tx, rx) = xch::bounded(4);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let failures = Arc::new(AtomicU64::new(0));
        let failures_clone = failures.clone();
        let epoch = clock.now();
        let thread_clock = clock.clone();

        let join_handle = std::thread::spawn(move || {
            let clock = thread_clock;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("telemetry monitor received shutdown signal");
                    break;
                }

                // one gate section: both reads describe the same instant
                let read = gate.exclusive(|ch| Ok((ch.positions()?, ch.temperatures()?)));
                match read {
                    Ok((positions, temperatures)) => {
                        let now = clock.ms_since(epoch);
                        let sample = Telemetry {
                            positions,
                            temperatures,
                            at_ms: now,
                        };
                        match tx.try_send(sample) {
                            Ok(()) | Err(xch::TrySendError::Full(_)) => {}
                            Err(xch::TrySendError::Disconnected(_)) => {
                                tracing::debug!("telemetry consumer disconnected, exiting thread");
                                break;
                            }
                        }
                        last_ok_clone.store(now, Ordering::Relaxed);
                    }
                    Err(e) => {
                        failures_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(error = %e, "telemetry read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("telemetry monitor thread exiting cleanly");
        });

        Self {
            rx,
            last_ok,
            failures,
            epoch,
            clock,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Most recent sample not yet consumed.
    pub fn latest(&self) -> Option<Telemetry> {
        self.rx.try_iter().last()
    }

    /// Failed reads so far (e.g. while disconnected).
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Milliseconds since the last successful read.
    pub fn stalled_for(&self) -> u64 {
        let now = self.clock.ms_since(self.epoch);
        now.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }
}

impl Drop for TelemetryMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("telemetry monitor thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "telemetry monitor thread panicked during shutdown");
                }
            }
        }
    }
}
