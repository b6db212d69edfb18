//! Type-state builder for `Hand`.
//!
//! `build()` is only available once a bus and a config have been supplied.
//! The store defaults to an in-memory one and the clock to `MonotonicClock`.
//!
//! The config is supplied exactly once:
//!
//! ```compile_fail
//! use hand_core::HandBuilder;
//! use hand_core::mocks::NoopBus;
//!
//! fn twice(cfg: hand_config::Config) {
//!     let _ = HandBuilder::new()
//!         .with_config(cfg.clone())
//!         .with_config(cfg)
//!         .with_bus(NoopBus)
//!         .build();
//! }
//! ```

use std::sync::Arc;

use hand_config::{CalibrationFile, Config, MemoryStore, Store};
use hand_traits::{Clock, MonotonicClock, MotorBus};

use crate::calibration::CancelToken;
use crate::error::{HandError, Result};
use crate::gate::HardwareGate;
use crate::hand::Hand;
use crate::model::HandModel;
use crate::state::CalibrationState;

// ── Type-state markers ───────────────────────────────────────────────────────

/// No bus supplied yet.
pub struct NoBus;
/// No config supplied yet.
pub struct Missing;
/// Config supplied.
pub struct Set(Config);

pub struct HandBuilder<B, C> {
    bus: B,
    config: C,
    store: Option<Box<dyn Store>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cancel: Option<CancelToken>,
}

impl Default for HandBuilder<NoBus, Missing> {
    fn default() -> Self {
        Self {
            bus: NoBus,
            config: Missing,
            store: None,
            clock: None,
            cancel: None,
        }
    }
}

impl HandBuilder<NoBus, Missing> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B> HandBuilder<B, Missing> {
    pub fn with_config(self, config: Config) -> HandBuilder<B, Set> {
        HandBuilder {
            bus: self.bus,
            config: Set(config),
            store: self.store,
            clock: self.clock,
            cancel: self.cancel,
        }
    }
}

impl<B, C> HandBuilder<B, C> {
    pub fn with_bus<B2: MotorBus>(self, bus: B2) -> HandBuilder<B2, C> {
        HandBuilder {
            bus,
            config: self.config,
            store: self.store,
            clock: self.clock,
            cancel: self.cancel,
        }
    }

    /// Where the calibration record is read from and persisted to.
    pub fn with_store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl<B: MotorBus> HandBuilder<B, Set> {
    /// Validate the config, load the calibration record and assemble the hand.
    ///
    /// A stored `calibrated = true` that the limits do not support is cleared
    /// and the correction persisted before the hand is returned.
    pub fn build(self) -> Result<Hand<B>> {
        let Set(config) = self.config;
        let model = HandModel::from_config(&config)?;
        let mut store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryStore::new()));

        let file = CalibrationFile::load(store.as_ref(), model.motor_ids())
            .map_err(|e| HandError::Config(e.to_string()))?;
        let mut state = CalibrationState::from_file(&model, &file)?;
        state.correct_flag(&model, store.as_mut())?;
        tracing::info!(
            motors = model.motor_count(),
            calibrated = state.is_complete(&model),
            "hand assembled"
        );

        let gate = Arc::new(HardwareGate::new(self.bus, model.motor_ids().to_vec()));
        Ok(Hand {
            model,
            state,
            gate,
            store,
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
