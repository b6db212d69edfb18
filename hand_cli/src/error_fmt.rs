//! Human-readable error descriptions and structured JSON error formatting.

use hand_core::HandError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(he) = err.downcast_ref::<HandError>() {
        return match he {
            HandError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or inconsistent keys in the config or calibration TOML.\nHow to fix: Edit the file named above, then rerun. etc/hand_config.toml is a complete example."
            ),
            HandError::Connection(msg) => format!(
                "What happened: Could not open the motor bus ({msg}).\nLikely causes: Wrong port, cable unplugged, or the port is held by another process.\nHow to fix: Check `port` and `baudrate` in the config and the USB connection."
            ),
            HandError::NotConnected => "What happened: A motor command was issued while the bus was disconnected.\nLikely causes: The connection dropped or connect was never called.\nHow to fix: Reconnect and retry.".to_string(),
            HandError::NotCalibrated { motor, joint } => format!(
                "What happened: Joint '{joint}' cannot be commanded because motor {motor} is not calibrated.\nLikely causes: No calibration yet, or a previous calibration stopped before reaching this motor.\nHow to fix: Run `hand calibrate` (or `hand calibrate --manual`)."
            ),
            HandError::Validation(msg) => format!(
                "What happened: Invalid request ({msg}).\nLikely causes: Unknown joint or motor name, or a value list of the wrong length.\nHow to fix: Use the identifiers declared in the config."
            ),
            HandError::CalibrationTimeout {
                step,
                pending,
                iterations,
            } => format!(
                "What happened: Calibration step {step} gave up after {iterations} iterations; motors {pending:?} never settled.\nLikely causes: A tendon is slack, the calibration current is too low to reach the stop, or the budget is too tight.\nHow to fix: Inspect the listed motors, then raise calibration.max_iterations / timeout_ms (0 = unbounded)."
            ),
            HandError::Cancelled => "What happened: Calibration was cancelled.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Rerun; limits of completed steps were already saved.".to_string(),
            HandError::DegenerateLimits { motor, joint } => format!(
                "What happened: Motor {motor} (joint '{joint}') reported the same position at both limits.\nLikely causes: The motor did not move, or the calibration sequence drives it the same way twice.\nHow to fix: Check the motor and the flex/extend entries of calibration.sequence."
            ),
            HandError::Operator(msg) => format!(
                "What happened: Manual calibration stopped waiting for the operator ({msg}).\nLikely causes: Input was closed before every pose was confirmed.\nHow to fix: Run interactively and press Enter after each pose."
            ),
            HandError::Storage(msg) => format!(
                "What happened: The calibration file could not be written ({msg}).\nLikely causes: Missing directory or no write permission.\nHow to fix: Check --calibration and its directory permissions."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<HandError>() {
        Some(HandError::Config(_)) => 2,
        Some(HandError::NotConnected) => 3,
        Some(HandError::NotCalibrated { .. }) => 4,
        Some(HandError::CalibrationTimeout { .. }) => 5,
        Some(HandError::Cancelled) => 6,
        _ => 1,
    }
}

/// Short stable name of the error kind, for JSON consumers.
pub fn error_kind(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<HandError>() {
        Some(HandError::Config(_)) => "Config",
        Some(HandError::Connection(_)) => "Connection",
        Some(HandError::NotConnected) => "NotConnected",
        Some(HandError::NotCalibrated { .. }) => "NotCalibrated",
        Some(HandError::Validation(_)) => "Validation",
        Some(HandError::Hardware(_)) => "Hardware",
        Some(HandError::HardwareFault(_)) => "HardwareFault",
        Some(HandError::CalibrationTimeout { .. }) => "CalibrationTimeout",
        Some(HandError::Cancelled) => "Cancelled",
        Some(HandError::DegenerateLimits { .. }) => "DegenerateLimits",
        Some(HandError::Operator(_)) => "Operator",
        Some(HandError::Storage(_)) => "Storage",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": error_kind(err), "message": humanize(err) });
    match err.downcast_ref::<HandError>() {
        Some(HandError::NotCalibrated { motor, joint }) => {
            obj["details"] = json!({ "motor": motor, "joint": joint });
        }
        Some(HandError::CalibrationTimeout {
            step,
            pending,
            iterations,
        }) => {
            obj["details"] = json!({ "step": step, "pending": pending, "iterations": iterations });
        }
        _ => {}
    }
    obj.to_string()
}
