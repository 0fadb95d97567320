//! Command bodies: backend assembly, control runs, jog, monitor, self-check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use grip_config::{Config, SlopeTable};
use grip_core::calibration::CalibrationModel;
use grip_core::cancel::{CancelToken, StopReason};
use grip_core::control::Telemetry;
use grip_core::error::{EstimateError, GripError};
use grip_core::frame::FrameLayout;
use grip_core::hw_error::map_transport_error;
use grip_core::jog::{JogDirection, JogParams, JogReport, run_jog};
use grip_core::latest::LatestFrame;
use grip_core::offset::{FrameSource, OffsetEstimator, SyncedTransport};
use grip_core::reader::{FrameReader, ReaderOptions};
use grip_core::runner::{Session, SessionReport, run_session};
use grip_core::scheduler::{CycleStats, Scheduler};
use grip_core::sync::{StreamSync, SyncStats};
use grip_traits::{Actuator, MonotonicClock, Transport};
use serde_json::json;

use crate::cli::{CliSafety, LAST_SAFETY, RtArgs};
use crate::monitor::{Unit, render_grid, render_summary};

type DynTransport = Box<dyn Transport + Send>;
type DynActuator = Box<dyn Actuator>;

/// Sensor link for the selected backend.
#[cfg(feature = "hardware")]
pub fn open_transport(cfg: &Config, _slopes: &SlopeTable) -> eyre::Result<DynTransport> {
    let port = grip_hardware::SerialTransport::open(&cfg.serial)?;
    Ok(Box::new(port))
}

#[cfg(not(feature = "hardware"))]
pub fn open_transport(cfg: &Config, slopes: &SlopeTable) -> eyre::Result<DynTransport> {
    let (transport, _) =
        grip_hardware::simulated_pair(cfg, slopes, grip_hardware::SimOptions::from_env());
    tracing::info!("using simulated sensor array");
    Ok(Box::new(transport))
}

/// Actuator for the selected backend. Motor bus drivers are not part of
/// this build, so hardware runs command a dry-run actuator.
#[cfg(feature = "hardware")]
pub fn open_actuator(_cfg: &Config) -> eyre::Result<DynActuator> {
    tracing::warn!("no motor driver configured; actuator commands are logged only");
    Ok(Box::new(grip_hardware::DryRunActuator::new()))
}

#[cfg(not(feature = "hardware"))]
pub fn open_actuator(cfg: &Config) -> eyre::Result<DynActuator> {
    Ok(Box::new(grip_hardware::SimulatedActuator::new(
        grip_hardware::SimPlant::default(),
        cfg.actuator.id,
    )))
}

/// Transport and actuator that observe the same physical gripper.
#[cfg(feature = "hardware")]
fn open_pair(cfg: &Config, slopes: &SlopeTable) -> eyre::Result<(DynTransport, DynActuator)> {
    Ok((open_transport(cfg, slopes)?, open_actuator(cfg)?))
}

#[cfg(not(feature = "hardware"))]
fn open_pair(cfg: &Config, slopes: &SlopeTable) -> eyre::Result<(DynTransport, DynActuator)> {
    let (transport, actuator) =
        grip_hardware::simulated_pair(cfg, slopes, grip_hardware::SimOptions::from_env());
    tracing::info!("using simulated sensor array and actuator");
    Ok((Box::new(transport), Box::new(actuator)))
}

fn close_quietly(transport: &mut dyn Transport) {
    if let Err(e) = transport.close() {
        tracing::warn!(error = %map_transport_error(e.as_ref()), "transport close failed");
    }
}

fn unix_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Command-line overrides for `grip run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOverrides {
    pub target_n: Option<f32>,
    pub kp: Option<f32>,
    pub ki: Option<f32>,
    pub kd: Option<f32>,
    pub duration_ms: Option<u64>,
    pub watchdog_ms: Option<u64>,
}

impl RunOverrides {
    /// Write the overrides into `cfg` and re-validate it.
    pub fn apply(&self, cfg: &mut Config) -> eyre::Result<()> {
        if let Some(v) = self.target_n {
            cfg.pid.target_n = v;
        }
        if let Some(v) = self.kp {
            cfg.pid.kp = v;
        }
        if let Some(v) = self.ki {
            cfg.pid.ki = v;
        }
        if let Some(v) = self.kd {
            cfg.pid.kd = v;
        }
        if let Some(v) = self.duration_ms {
            cfg.safety.max_run_ms = v;
        }
        if let Some(v) = self.watchdog_ms {
            cfg.safety.watchdog_ms = v;
        }
        cfg.validate()
    }
}

fn spawn_telemetry_printer(
    rx: xch::Receiver<Telemetry>,
    every: u64,
    json_mode: bool,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for t in rx.iter() {
            if t.cycle % every != 0 {
                continue;
            }
            if json_mode {
                println!(
                    "{}",
                    json!({
                        "cycle": t.cycle,
                        "total_n": t.total_n,
                        "target_n": t.target_n,
                        "output_nm": t.output_nm,
                        "frame_seq": t.frame_seq,
                        "stale": t.stale,
                    })
                );
            } else {
                println!(
                    "cycle {:>7}  force {:>8.4} N  target {:>6.3} N  torque {:>7.4} Nm{}",
                    t.cycle,
                    t.total_n,
                    t.target_n,
                    t.output_nm,
                    if t.stale { "  (stale)" } else { "" }
                );
            }
        }
    })
}

/// `grip run`: offsets, then closed-loop force control until stopped.
#[allow(clippy::too_many_arguments)]
pub fn run_control(
    cfg: &mut Config,
    slopes: &SlopeTable,
    overrides: RunOverrides,
    print_every: u64,
    rt: &RtArgs,
    stats: bool,
    json_mode: bool,
    cancel: &CancelToken,
) -> eyre::Result<SessionReport> {
    overrides.apply(cfg)?;
    crate::rt::apply(rt);

    let mut session = Session::from_config(cfg, slopes)?;
    let _ = LAST_SAFETY.set(CliSafety {
        watchdog_ms: session.params.watchdog_ms,
        max_run_ms: session.params.max_run_ms,
    });

    let printer = if print_every > 0 {
        let (tx, rx) = xch::bounded(256);
        session = session.with_telemetry(tx);
        Some(spawn_telemetry_printer(rx, print_every, json_mode))
    } else {
        None
    };

    let (transport, actuator) = open_pair(cfg, slopes)?;
    let started = Instant::now();
    tracing::info!(
        target_n = cfg.pid.target_n,
        offset_frames = cfg.offset.frames,
        "estimating zero-load offsets; keep the gripper unloaded"
    );
    let result = run_session(transport, actuator, session, cancel);
    if let Some(handle) = printer
        && handle.join().is_err()
    {
        tracing::warn!("telemetry printer panicked");
    }
    let report = result?;

    if stats {
        print_stats(&report.cycles, &report.sync, cfg.scheduler.period_us);
    }
    if json_mode {
        println!(
            "{}",
            json!({
                "timestamp": unix_ts(),
                "command": "run",
                "stop": report.stop.as_str(),
                "target_n": cfg.pid.target_n,
                "duration_ms": grip_core::util::duration_ms(started.elapsed()),
                "cycles": report.cycles.cycles,
                "overruns": report.cycles.overruns,
                "total_frames": report.sync.total_frames,
                "sync_errors": report.sync.sync_errors,
                "error_rate_percent": report.sync.error_rate_percent(),
                "last_output_nm": report.last_output_nm,
                "dropped_telemetry": report.dropped_telemetry,
                "offset_sensors": report.offsets.len(),
            })
        );
    } else {
        println!(
            "Session stopped ({}) after {} cycles; actuator zeroed and disabled.",
            report.stop, report.cycles.cycles
        );
    }
    Ok(report)
}

/// `grip jog`: fixed open/close torque for a while.
#[allow(clippy::too_many_arguments)]
pub fn jog(
    cfg: &Config,
    open: bool,
    torque: Option<f32>,
    duration_ms: u64,
    rt: &RtArgs,
    json_mode: bool,
    cancel: &CancelToken,
) -> eyre::Result<JogReport> {
    let (direction, default_torque) = if open {
        (JogDirection::Open, cfg.actuator.open_torque_nm)
    } else {
        (JogDirection::Close, cfg.actuator.close_torque_nm)
    };
    let params = JogParams {
        actuator_id: cfg.actuator.id,
        direction,
        torque_nm: torque.unwrap_or(default_torque),
        limit_nm: cfg.pid.output_limit_nm,
        duration_ms,
    };
    // Reject a wrong-signed torque before touching the motor.
    direction.validate(params.torque_nm)?;
    crate::rt::apply(rt);

    let mut actuator = open_actuator(cfg)?;
    let mut scheduler = Scheduler::from(&cfg.scheduler);
    let report = run_jog(&mut actuator, params, &mut scheduler, cancel)?;
    if json_mode {
        println!(
            "{}",
            json!({
                "timestamp": unix_ts(),
                "command": "jog",
                "direction": if open { "open" } else { "close" },
                "torque_nm": report.torque_nm,
                "stop": report.stop.as_str(),
                "cycles": report.cycles.cycles,
            })
        );
    } else {
        println!(
            "Jog {} at {:.3} Nm stopped ({}) after {} cycles.",
            if open { "open" } else { "close" },
            report.torque_nm,
            report.stop,
            report.cycles.cycles
        );
    }
    Ok(report)
}

/// `grip monitor`: print the live grid at a fixed refresh interval.
#[allow(clippy::too_many_arguments)]
pub fn monitor(
    cfg: &Config,
    slopes: &SlopeTable,
    zero: bool,
    every_ms: u64,
    duration_ms: u64,
    json_mode: bool,
    cancel: &CancelToken,
) -> eyre::Result<()> {
    let mut model = CalibrationModel::from_config(&cfg.sensor, slopes)?;
    let grid = *model.grid();
    let mut transport = open_transport(cfg, slopes)?;
    let mut sync = StreamSync::new(FrameLayout::from(&cfg.sensor));

    if zero {
        tracing::info!(frames = cfg.offset.frames, "zeroing; keep the gripper unloaded");
        let estimate = {
            let mut src = SyncedTransport::new(&mut transport, &mut sync, cfg.serial.read_chunk);
            OffsetEstimator::from(cfg).estimate(&mut src, cancel)
        };
        match estimate {
            Ok(table) => model.set_offsets(table),
            Err(EstimateError::Interrupted { .. }) => {
                close_quietly(&mut transport);
                return Ok(());
            }
            Err(e) => {
                close_quietly(&mut transport);
                return Err(GripError::Estimate(e).into());
            }
        }
    }

    let latest = LatestFrame::new();
    let reader = FrameReader::spawn(
        transport,
        sync,
        model,
        latest.clone(),
        cancel.clone(),
        ReaderOptions {
            read_chunk: cfg.serial.read_chunk,
            read_timeout: Duration::from_millis(cfg.serial.read_timeout_ms),
        },
        Arc::new(MonotonicClock::new()),
    );

    let mut scheduler = Scheduler::new(
        Duration::from_millis(every_ms.max(1)),
        Duration::ZERO,
        Duration::from_millis(1),
    );
    let started = scheduler.start();
    while let Some(tick) = scheduler.wait_next(cancel) {
        match latest.latest() {
            Some(f) if json_mode => {
                let kpa: Vec<f64> = f.readings.iter().map(|r| r.kpa).collect();
                println!(
                    "{}",
                    json!({
                        "seq": f.seq,
                        "total_n": f.total_n,
                        "max_kpa": f.max_kpa,
                        "kpa": kpa,
                    })
                );
            }
            Some(f) => {
                let stats = reader.sync_stats();
                println!("{}", render_grid(&f, &grid, Unit::Kpa));
                println!("{}", render_grid(&f, &grid, Unit::Newtons));
                println!("{}\n", render_summary(&f, &stats));
            }
            None => tracing::info!("waiting for sensor frames"),
        }
        if duration_ms > 0
            && grip_core::util::duration_ms(tick.woke_at.saturating_duration_since(started))
                >= duration_ms
        {
            cancel.cancel(StopReason::Completed);
        }
    }

    let mut exit = reader.join()?;
    close_quietly(&mut exit.transport);
    if let Some(e) = exit.error {
        return Err(e.into());
    }
    Ok(())
}

/// `grip self-check`: one valid frame within the offset timeout.
pub fn self_check(
    cfg: &Config,
    slopes: &SlopeTable,
    json_mode: bool,
    cancel: &CancelToken,
) -> eyre::Result<()> {
    let mut transport = open_transport(cfg, slopes)?;
    let mut sync = StreamSync::new(FrameLayout::from(&cfg.sensor));
    let budget = Duration::from_millis(cfg.offset.timeout_ms);
    let read_timeout = Duration::from_millis(cfg.serial.read_timeout_ms);
    let t0 = Instant::now();

    let outcome = {
        let mut src = SyncedTransport::new(&mut transport, &mut sync, cfg.serial.read_chunk);
        loop {
            if cancel.is_cancelled() {
                break Ok(None);
            }
            let elapsed = t0.elapsed();
            if elapsed >= budget {
                break Err(GripError::TransportTimeout);
            }
            match src.next_raw(read_timeout.min(budget - elapsed)) {
                Ok(Some(frame)) => break Ok(Some(frame)),
                Ok(None) => {}
                Err(e) => match map_transport_error(e.as_ref()) {
                    GripError::TransportTimeout => {}
                    other => break Err(other),
                },
            }
        }
    };
    close_quietly(&mut transport);

    let Some(frame) = outcome? else {
        println!("self-check interrupted");
        return Ok(());
    };
    let ms = grip_core::util::duration_ms(t0.elapsed());
    let stats = sync.stats();
    if json_mode {
        println!(
            "{}",
            json!({
                "timestamp": unix_ts(),
                "command": "self-check",
                "ok": true,
                "first_frame_ms": ms,
                "sensors": frame.len(),
                "discarded_bytes": stats.discarded_bytes,
                "sync_errors": stats.sync_errors,
            })
        );
    } else {
        println!(
            "OK: valid frame after {ms} ms ({} sensors, {} bytes skipped, {} checksum errors)",
            frame.len(),
            stats.discarded_bytes,
            stats.sync_errors
        );
    }
    Ok(())
}

/// Cycle timing and link stats to stderr.
fn print_stats(cycles: &CycleStats, sync: &SyncStats, period_us: u64) {
    eprintln!("\n--- Grip Stats ---");
    eprintln!("Cycles: {}", cycles.cycles);
    eprintln!(
        "Period (us): {period_us} ({:.1} Hz)",
        grip_core::util::rate_hz(period_us)
    );
    eprintln!(
        "Wake latency min/avg/max (us): {} / {} / {}",
        cycles.min_late_or_zero().as_micros(),
        cycles.avg_late().as_micros(),
        cycles.max_late.as_micros()
    );
    eprintln!("Overruns: {}", cycles.overruns);
    eprintln!(
        "Frames: {} (checksum errors {}, {:.2}%; resyncs {}; bytes skipped {})",
        sync.total_frames,
        sync.sync_errors,
        sync.error_rate_percent(),
        sync.resyncs,
        sync.discarded_bytes
    );
    eprintln!("------------------\n");
}
