//! Common time helpers for hand_core.

use std::time::Duration;

/// Convert a configured period in seconds to a `Duration`.
/// - Non-finite and non-positive values map to zero (no pause).
#[inline]
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_duration() {
        assert_eq!(secs_to_duration(0.01), Duration::from_millis(10));
        assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
    }
}
