//! `hand`: command-line front end for the hand controller.

mod cli;
mod error_fmt;
mod operator;
mod run;

use std::path::Path;

use clap::Parser;
use hand_config::Logging;
use hand_core::CancelToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn init_tracing(json: bool, level: &str, logging: Option<&Logging>) {
    // RUST_LOG wins over --log-level, which wins over the config
    let level = logging
        .and_then(|l| l.level.as_deref())
        .filter(|_| level == "info")
        .unwrap_or(level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = logging.and_then(|l| l.file.as_deref()).map(|path| {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "hand.log".into());
        let appender = match logging.and_then(|l| l.rotation.as_deref()) {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = run::load_config(&cli.config);
    init_tracing(
        cli.json,
        &cli.log_level,
        cfg.as_ref().ok().map(|c| &c.logging),
    );
    let cfg = cfg?;
    tracing::debug!(config = %cli.config.display(), calibration = %cli.calibration.display(), "starting");

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }) {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
        }
    }

    let (mut hand, sim) = run::build_hand(cfg, &cli.calibration, cancel)?;
    run::run(cli.cmd, &mut hand, &sim, cli.json)
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    let code = match real_main(cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}
