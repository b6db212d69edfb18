//! Maps `Box<dyn Error>` from the `MotorBus` boundary to typed `HandError`.
//!
//! The traits in `hand_traits` use `Box<dyn Error + Send + Sync>` so any
//! transport can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `hand_hardware::HwError` downcasting.

use crate::error::HandError;

/// Map a trait-boundary error to a typed `HandError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> HandError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<hand_hardware::HwError>() {
            return match hw {
                hand_hardware::HwError::NotConnected => HandError::NotConnected,
                hand_hardware::HwError::Port(msg) => HandError::Connection(msg.clone()),
                other => HandError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("not connected") {
        HandError::NotConnected
    } else {
        HandError::Hardware(s)
    }
}
