//! Hand assembly and command execution.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use hand_config::{CalibrationStrategy, Config, TomlFileStore};
use hand_core::conversions::optional_millis;
use hand_core::{CalibrationReport, CancelToken, Hand, HandBuilder, HandError};
use hand_hardware::{SimHandle, SimulatedHand};
use serde_json::json;

use crate::cli::Commands;
use crate::operator::{PromptOperator, SimulatedOperator};

type Result<T> = eyre::Result<T>;

/// How long `self-check` waits for the first telemetry sample.
const SELF_CHECK_WAIT: Duration = Duration::from_secs(2);

/// Load and validate the static config; every failure is a config error.
pub fn load_config(path: &Path) -> Result<Config> {
    let cfg = hand_config::load_config(path).map_err(|e| HandError::Config(e.to_string()))?;
    Ok(cfg)
}

/// Assemble a hand on the simulated bus and connect it.
pub fn build_hand(
    cfg: Config,
    calibration: &Path,
    cancel: CancelToken,
) -> Result<(Hand<SimulatedHand>, SimHandle)> {
    let sim = SimulatedHand::new(&cfg.motor_ids);
    let handle = sim.handle();
    let port = cfg.port.clone();
    let hand = HandBuilder::new()
        .with_bus(sim)
        .with_config(cfg)
        .with_store(TomlFileStore::new(calibration))
        .with_cancel_token(cancel)
        .build()?;
    let status = hand.connect();
    if !status.ok {
        return Err(HandError::Connection(status.message).into());
    }
    tracing::info!(%port, "{}", status.message);
    Ok((hand, handle))
}

pub fn run(cmd: Commands, hand: &mut Hand<SimulatedHand>, sim: &SimHandle, json: bool) -> Result<()> {
    match cmd {
        Commands::Calibrate {
            manual,
            max_iterations,
            timeout_ms,
        } => {
            if max_iterations.is_some() || timeout_ms.is_some() {
                let mut budget = hand.model().calibration().budget;
                if let Some(n) = max_iterations {
                    budget.max_iterations = (n > 0).then_some(n);
                }
                if let Some(ms) = timeout_ms {
                    budget.max_duration = optional_millis(ms);
                }
                hand.set_calibration_budget(budget);
            }
            let manual = manual || hand.model().calibration().strategy == CalibrationStrategy::Manual;
            let report = if manual {
                let mut operator = SimulatedOperator::new(sim.clone(), PromptOperator::stdio());
                hand.calibrate_manual(&mut operator)?
            } else {
                hand.calibrate()?
            };
            print_report(&report, json);
        }
        Commands::Init { calibrate } => {
            let report = hand.init_joints(calibrate)?;
            if let Some(report) = &report {
                print_report(report, json);
            }
            print_status(hand, json)?;
        }
        Commands::Status => print_status(hand, json)?,
        Commands::Set { targets } => {
            let targets: BTreeMap<String, f64> = targets.into_iter().collect();
            hand.enable_torque(None)?;
            hand.set_joint_positions(&targets)?;
            print_status(hand, json)?;
        }
        Commands::SelfCheck => self_check(hand, json)?,
    }
    Ok(())
}

fn print_report(report: &CalibrationReport, json: bool) {
    if json {
        let limits: Vec<_> = report
            .steps
            .iter()
            .flat_map(|s| s.samples.iter().map(move |l| (s.step, l)))
            .map(|(step, l)| {
                json!({
                    "step": step,
                    "motor": l.motor,
                    "joint": l.joint,
                    "bound": l.bound.to_string(),
                    "value": l.value,
                    "iterations": l.iterations,
                })
            })
            .collect();
        let out = json!({
            "strategy": report.strategy,
            "calibrated": report.calibrated,
            "limits": limits,
            "ratios": report.ratios,
        });
        println!("{out}");
        return;
    }
    for step in &report.steps {
        for l in &step.samples {
            println!(
                "step {}: motor {} ({}) {} limit {:.4} rad",
                step.step, l.motor, l.joint, l.bound, l.value
            );
        }
    }
    println!("calibrated: {}", yes_no(report.calibrated));
}

fn print_status(hand: &Hand<SimulatedHand>, json: bool) -> Result<()> {
    let joints = hand.joint_positions()?;
    let temps = hand.motor_temperatures()?;
    let temps: BTreeMap<String, f64> = hand
        .model()
        .motor_ids()
        .iter()
        .map(|m| m.to_string())
        .zip(temps)
        .collect();
    if json {
        let out = json!({
            "calibrated": hand.is_calibrated(),
            "joints": joints,
            "temperatures": temps,
        });
        println!("{out}");
        return Ok(());
    }
    println!("calibrated: {}", yes_no(hand.is_calibrated()));
    for (joint, pos) in &joints {
        match pos {
            Some(p) => println!("  {joint:<12} {p:>8.4} rad"),
            None => println!("  {joint:<12} {:>8}", "-"),
        }
    }
    for (motor, t) in &temps {
        println!("  motor {motor:<3} {t:>5.1} °C");
    }
    Ok(())
}

fn self_check(hand: &Hand<SimulatedHand>, json: bool) -> Result<()> {
    let monitor = hand.monitor(Duration::from_millis(20));
    let deadline = Instant::now() + SELF_CHECK_WAIT;
    let sample = loop {
        if let Some(t) = monitor.latest() {
            break t;
        }
        if Instant::now() >= deadline {
            eyre::bail!(
                "self-check failed: no telemetry within {:?} ({} failed reads)",
                SELF_CHECK_WAIT,
                monitor.failures()
            );
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    if json {
        println!(
            "{}",
            json!({ "ok": true, "motors": sample.positions.len(), "temperatures": sample.temperatures })
        );
    } else {
        println!("self-check ok ({} motors)", sample.positions.len());
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}
