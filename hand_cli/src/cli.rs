//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "hand", version, about = "Robotic hand controller (simulated bus)")]
pub struct Cli {
    /// Path to the static hand config (TOML)
    #[arg(long, value_name = "FILE", default_value = "etc/hand_config.toml")]
    pub config: PathBuf,

    /// Path to the calibration file (TOML); created on first calibration
    #[arg(long, value_name = "FILE", default_value = "etc/calibration.toml")]
    pub calibration: PathBuf,

    /// Log and print results as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find every motor's travel limits and persist the calibration
    Calibrate {
        /// Ask an operator to hold each pose instead of detecting stalls
        #[arg(long, action = ArgAction::SetTrue)]
        manual: bool,
        /// Give up a step after this many drive iterations
        #[arg(long, value_name = "N")]
        max_iterations: Option<u64>,
        /// Give up a step after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
    /// Torque on, configured mode and current, calibrate if needed, zero all joints
    Init {
        /// Recalibrate even if the hand is already calibrated
        #[arg(long, action = ArgAction::SetTrue)]
        calibrate: bool,
    },
    /// Print calibration state, joint positions and temperatures
    Status,
    /// Command joint positions, e.g. `hand set index_mcp=0.5 thumb_mcp=0.2`
    Set {
        #[arg(value_name = "JOINT=RAD", required = true, value_parser = parse_assignment)]
        targets: Vec<(String, f64)>,
    },
    /// Quick health check (bus reachable, telemetry readable)
    SelfCheck,
}

/// Parse `joint=radians`.
pub fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (joint, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected JOINT=RAD, got '{s}'"))?;
    let joint = joint.trim();
    if joint.is_empty() {
        return Err(format!("missing joint name in '{s}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    if !value.is_finite() {
        return Err(format!("'{s}' must be finite"));
    }
    Ok((joint.to_string(), value))
}
