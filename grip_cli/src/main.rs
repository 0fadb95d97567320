#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `grip`: force-controlled gripping with a 6x6 pressure array.

mod cli;
mod commands;
mod error_fmt;
mod monitor;
mod rt;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use grip_config::{Config, SlopeTable};
use grip_core::cancel::{CancelToken, StopReason};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::commands::RunOverrides;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // Install the color-eyre handler once; ignore double-install in tests.
    let _ = color_eyre::install();

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let mut cfg = load_config(&cli.config)?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let slopes = load_slopes(cli.calibration.as_deref(), &cfg)?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            if cancel.cancel(StopReason::Interrupt) {
                tracing::warn!("interrupt received; stopping");
            }
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    match cli.cmd {
        Commands::Run {
            target_n,
            kp,
            ki,
            kd,
            duration_ms,
            watchdog_ms,
            print_every,
            rt,
            stats,
        } => {
            let overrides = RunOverrides {
                target_n,
                kp,
                ki,
                kd,
                duration_ms,
                watchdog_ms,
            };
            commands::run_control(
                &mut cfg,
                &slopes,
                overrides,
                print_every,
                &rt,
                stats,
                cli.json,
                &cancel,
            )?;
        }
        Commands::Jog {
            open,
            close: _,
            torque,
            duration_ms,
            rt,
        } => {
            commands::jog(&cfg, open, torque, duration_ms, &rt, cli.json, &cancel)?;
        }
        Commands::Monitor {
            zero,
            every_ms,
            duration_ms,
        } => {
            commands::monitor(&cfg, &slopes, zero, every_ms, duration_ms, cli.json, &cancel)?;
        }
        Commands::SelfCheck => commands::self_check(&cfg, &slopes, cli.json, &cancel)?,
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = grip_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e.message()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn load_slopes(path: Option<&Path>, cfg: &Config) -> eyre::Result<SlopeTable> {
    let slopes = match path {
        Some(p) => grip_config::load_calibration_csv(p, cfg.sensor.sensor_count)?,
        None => grip_config::default_slopes(),
    };
    let missing = slopes.missing(cfg.sensor.sensor_count);
    if !missing.is_empty() {
        tracing::warn!(?missing, "no slope for these sensors; they will read 0");
    }
    Ok(slopes)
}

fn init_tracing(json: bool, level: Option<&str>, cfg: &Config) -> eyre::Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        layers.push(console.json().boxed());
    } else {
        layers.push(console.pretty().boxed());
    }

    if let Some(file) = cfg.logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file must name a file, got {file:?}"))?;
        let appender = match cfg.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let lvl = level.or(cfg.logging.level.as_deref()).unwrap_or("info");
        EnvFilter::new(lvl)
    });

    // Ignore "already set" so tests that call main twice keep working.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
    Ok(())
}
