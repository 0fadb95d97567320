//! Manual open/close jog: a fixed torque every cycle until stopped.
use grip_traits::Actuator;

use crate::cancel::{CancelToken, StopReason};
use crate::control::zero_and_disable;
use crate::error::{GripError, Result};
use crate::hw_error::map_actuator_error;
use crate::scheduler::{CycleStats, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    /// Negative torque.
    Open,
    /// Positive torque.
    Close,
}

impl JogDirection {
    /// Check that `torque_nm` has the sign this direction requires.
    pub fn validate(self, torque_nm: f32) -> std::result::Result<(), GripError> {
        if !torque_nm.is_finite() {
            return Err(GripError::Config(format!("jog torque must be finite, got {torque_nm}")));
        }
        match self {
            Self::Open if torque_nm > 0.0 => Err(GripError::Config(format!(
                "open torque must be <= 0, got {torque_nm}"
            ))),
            Self::Close if torque_nm < 0.0 => Err(GripError::Config(format!(
                "close torque must be >= 0, got {torque_nm}"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JogParams {
    pub actuator_id: u16,
    pub direction: JogDirection,
    pub torque_nm: f32,
    /// Symmetric clamp applied to `torque_nm`.
    pub limit_nm: f32,
    /// Stop with [`StopReason::Completed`] after this long (ms). 0 = until cancelled.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct JogReport {
    pub stop: StopReason,
    pub torque_nm: f32,
    pub cycles: CycleStats,
}

/// Enable, send the jog torque every scheduler cycle, then zero and disable.
pub fn run_jog<A: Actuator + ?Sized>(
    actuator: &mut A,
    params: JogParams,
    scheduler: &mut Scheduler,
    cancel: &CancelToken,
) -> Result<JogReport> {
    params.direction.validate(params.torque_nm)?;
    let limit = params.limit_nm.abs();
    let torque = params.torque_nm.clamp(-limit, limit);
    if (torque - params.torque_nm).abs() > f32::EPSILON {
        tracing::warn!(requested = params.torque_nm, applied = torque, "jog torque clamped");
    }

    if let Err(e) = actuator.enable(params.actuator_id) {
        let e = map_actuator_error(e.as_ref());
        tracing::error!(error = %e, "actuator enable failed");
        let _ = zero_and_disable(actuator, params.actuator_id);
        return Err(eyre::Report::new(e));
    }

    let started = scheduler.start();
    tracing::info!(direction = ?params.direction, torque_nm = torque, "jog start");
    let mut failure = None;
    while let Some(tick) = scheduler.wait_next(cancel) {
        if let Err(e) = actuator.set_torque(params.actuator_id, torque) {
            let e = map_actuator_error(e.as_ref());
            tracing::error!(error = %e, cycle = tick.cycle, "jog command failed");
            cancel.cancel(StopReason::Fault);
            failure = Some(e);
            break;
        }
        if params.duration_ms > 0
            && tick.woke_at.saturating_duration_since(started).as_millis()
                >= u128::from(params.duration_ms)
        {
            cancel.cancel(StopReason::Completed);
        }
    }

    let shutdown = zero_and_disable(actuator, params.actuator_id);
    let stop = cancel.reason().unwrap_or(StopReason::Operator);
    tracing::info!(stop = %stop, cycles = scheduler.stats().cycles, "jog stop");
    if let Some(e) = failure {
        return Err(eyre::Report::new(e));
    }
    shutdown.map_err(eyre::Report::new)?;
    Ok(JogReport {
        stop,
        torque_nm: torque,
        cycles: *scheduler.stats(),
    })
}
