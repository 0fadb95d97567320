//! One control session: estimate offsets → control loop → safe shutdown.
//!
//! Shutdown order is the same on every path: zero torque, disable the
//! actuator, stop the reader, close the transport.
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as xch;
use grip_traits::{Actuator, Clock, MonotonicClock, Transport};

use crate::calibration::{CalibrationModel, OffsetTable};
use crate::cancel::{CancelToken, StopReason};
use crate::control::{Controller, Telemetry, zero_and_disable};
use crate::error::{BuildError, EstimateError, GripError, Result};
use crate::frame::FrameLayout;
use crate::hw_error::map_transport_error;
use crate::latest::LatestFrame;
use crate::offset::{OffsetEstimator, SyncedTransport};
use crate::pid::Pid;
use crate::reader::{FrameReader, ReaderOptions};
use crate::scheduler::{CycleStats, Scheduler};
use crate::sync::{StreamSync, SyncStats};

/// Scalar session settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionParams {
    pub actuator_id: u16,
    pub target_n: f64,
    pub read_chunk: usize,
    pub read_timeout: Duration,
    /// Maximum time without a valid frame once control runs (ms, >= 1).
    pub watchdog_ms: u64,
    /// Stop with [`StopReason::Completed`] after this long (ms). 0 = unbounded.
    pub max_run_ms: u64,
}

/// Everything a session needs apart from its two collaborators.
pub struct Session {
    pub layout: FrameLayout,
    pub model: CalibrationModel,
    pub estimator: OffsetEstimator,
    pub pid: Pid,
    pub scheduler: Scheduler,
    pub params: SessionParams,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub telemetry: Option<xch::Sender<Telemetry>>,
}

impl Session {
    /// Assemble a session from validated config and a slope table.
    pub fn from_config(cfg: &grip_config::Config, slopes: &grip_config::SlopeTable) -> Result<Self> {
        let model = CalibrationModel::from_config(&cfg.sensor, slopes)
            .map_err(|_| eyre::Report::new(BuildError::InvalidConfig("sensor_count must be a perfect square")))?;
        if cfg.serial.read_chunk == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig("read_chunk must be > 0")));
        }
        let period_ms = crate::util::period_ms(cfg.scheduler.period_us);
        let watchdog_ms = if cfg.safety.watchdog_ms == 0 {
            crate::util::stall_threshold_ms(cfg.serial.read_timeout_ms, period_ms, cfg.safety.max_run_ms)
        } else {
            cfg.safety.watchdog_ms
        };
        Ok(Self {
            layout: FrameLayout::from(&cfg.sensor),
            model,
            estimator: OffsetEstimator::from(cfg),
            pid: Pid::from(&cfg.pid),
            scheduler: Scheduler::from(&cfg.scheduler),
            params: SessionParams {
                actuator_id: cfg.actuator.id,
                target_n: f64::from(cfg.pid.target_n),
                read_chunk: cfg.serial.read_chunk,
                read_timeout: Duration::from_millis(cfg.serial.read_timeout_ms),
                watchdog_ms,
                max_run_ms: cfg.safety.max_run_ms,
            },
            clock: Arc::new(MonotonicClock::new()),
            telemetry: None,
        })
    }

    #[must_use]
    pub fn with_telemetry(mut self, tx: xch::Sender<Telemetry>) -> Self {
        self.telemetry = Some(tx);
        self
    }

    /// Use `clock` for the estimator, PID, scheduler and reader alike.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.estimator = self.estimator.with_clock(clock.clone());
        self.scheduler = self.scheduler.with_clock(clock.clone());
        let (kp, ki, kd) = self.pid.gains();
        self.pid = Pid::with_clock(kp, ki, kd, self.pid.limit(), clock.clone());
        self.clock = clock;
        self
    }
}

/// How a session ended when it ended without error.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub stop: StopReason,
    pub offsets: OffsetTable,
    pub cycles: CycleStats,
    pub sync: SyncStats,
    pub last_output_nm: f64,
    pub dropped_telemetry: u64,
}

/// Run one session to completion.
///
/// Returns `Ok` for completion and for interrupt/operator/UI stops (including
/// an interrupted offset estimate). Estimation failures, transport and
/// actuator errors and watchdog trips return `Err` after the safe shutdown.
pub fn run_session<T, A>(
    transport: T,
    actuator: A,
    session: Session,
    cancel: &CancelToken,
) -> Result<SessionReport>
where
    T: Transport + Send + 'static,
    A: Actuator,
{
    let Session {
        layout,
        mut model,
        estimator,
        pid,
        mut scheduler,
        params,
        clock,
        telemetry,
    } = session;
    let mut transport = transport;
    let mut actuator = actuator;
    let mut sync = StreamSync::new(layout);

    // Offsets first; control never starts on an unfinished table.
    let estimate = {
        let mut src = SyncedTransport::new(&mut transport, &mut sync, params.read_chunk);
        estimator.estimate(&mut src, cancel)
    };
    let offsets = match estimate {
        Ok(t) => t,
        Err(e) => {
            let shutdown = zero_and_disable(&mut actuator, params.actuator_id);
            close_transport(&mut transport);
            if let EstimateError::Interrupted { .. } = e {
                shutdown.map_err(eyre::Report::new)?;
                return Ok(SessionReport {
                    stop: cancel.reason().unwrap_or(StopReason::Interrupt),
                    offsets: OffsetTable::new(),
                    cycles: CycleStats::default(),
                    sync: sync.stats(),
                    last_output_nm: 0.0,
                    dropped_telemetry: 0,
                });
            }
            cancel.cancel(StopReason::Fault);
            return Err(eyre::Report::new(GripError::Estimate(e)));
        }
    };
    model.set_offsets(offsets.clone());

    let mut controller = Controller::new(actuator, params.actuator_id, pid, params.target_n);
    if let Some(tx) = telemetry {
        controller = controller.with_telemetry(tx);
    }
    if let Err(e) = controller.begin() {
        tracing::error!(error = %e, "actuator enable failed");
        cancel.cancel(StopReason::Fault);
        if let Err(se) = controller.safe_shutdown() {
            tracing::warn!(error = %se, "shutdown after failed enable incomplete");
        }
        close_transport(&mut transport);
        return Err(eyre::Report::new(e));
    }

    let latest = LatestFrame::new();
    let reader = FrameReader::spawn(
        transport,
        sync,
        model,
        latest.clone(),
        cancel.clone(),
        ReaderOptions {
            read_chunk: params.read_chunk,
            read_timeout: params.read_timeout,
        },
        clock.clone(),
    );

    let started = scheduler.start();
    tracing::info!(
        target_n = params.target_n,
        period_us = scheduler.period().as_micros(),
        watchdog_ms = params.watchdog_ms,
        "control start"
    );

    let mut failure: Option<GripError> = None;
    while let Some(tick) = scheduler.wait_next(cancel) {
        let stalled_ms = reader.stalled_for_ms();
        if stalled_ms > params.watchdog_ms {
            tracing::error!(stalled_ms, threshold_ms = params.watchdog_ms, "sensor watchdog tripped");
            cancel.cancel(StopReason::Watchdog);
            failure = Some(GripError::Watchdog {
                stalled_ms,
                threshold_ms: params.watchdog_ms,
            });
            break;
        }

        let frame = latest.latest();
        if let Err(e) = controller.cycle(tick.cycle, frame.as_deref()) {
            tracing::error!(error = %e, cycle = tick.cycle, "control cycle failed");
            cancel.cancel(StopReason::Fault);
            failure = Some(e);
            break;
        }

        if params.max_run_ms > 0 && clock.ms_since(started) >= params.max_run_ms {
            cancel.cancel(StopReason::Completed);
        }
    }

    // Safe shutdown: actuator first, then the reader and its transport.
    let shutdown = controller.safe_shutdown();
    let stop = cancel.reason().unwrap_or(StopReason::Operator);
    let mut sync_stats = reader.sync_stats();
    match reader.join() {
        Ok(mut exit) => {
            sync_stats = exit.stats;
            close_transport(&mut exit.transport);
            if failure.is_none() {
                failure = exit.error;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "frame reader did not stop cleanly");
            if failure.is_none() {
                failure = Some(e);
            }
        }
    }

    let cycles = *scheduler.stats();
    tracing::info!(
        stop = %stop,
        cycles = cycles.cycles,
        overruns = cycles.overruns,
        total_frames = sync_stats.total_frames,
        sync_errors = sync_stats.sync_errors,
        "control stop"
    );

    if let Some(e) = failure {
        return Err(eyre::Report::new(e));
    }
    shutdown.map_err(eyre::Report::new)?;
    Ok(SessionReport {
        stop,
        offsets,
        cycles,
        sync: sync_stats,
        last_output_nm: controller.last_output(),
        dropped_telemetry: controller.dropped_telemetry(),
    })
}

/// Best-effort transport close; failures are logged, never returned.
pub(crate) fn close_transport<T: Transport + ?Sized>(transport: &mut T) {
    if let Err(e) = transport.close() {
        let mapped = map_transport_error(e.as_ref());
        tracing::warn!(error = %mapped, "transport close failed");
    } else {
        tracing::debug!("transport closed");
    }
}
