//! `From` implementations bridging `grip_config` types to `grip_core` types.

use std::time::Duration;

use grip_config::SlopeTable;

use crate::calibration::{CalibrationModel, GridError, SensorGrid};
use crate::frame::FrameLayout;
use crate::offset::OffsetEstimator;
use crate::pid::Pid;
use crate::scheduler::Scheduler;

// ── Sensor ───────────────────────────────────────────────────────────────────

impl From<&grip_config::SensorCfg> for FrameLayout {
    fn from(c: &grip_config::SensorCfg) -> Self {
        Self::new(c.header, c.sensor_count)
    }
}

impl TryFrom<&grip_config::SensorCfg> for SensorGrid {
    type Error = GridError;
    fn try_from(c: &grip_config::SensorCfg) -> Result<Self, Self::Error> {
        Self::new(c.sensor_count, c.row_order)
    }
}

impl CalibrationModel {
    /// Model for the configured array with the given slopes and no offsets.
    pub fn from_config(c: &grip_config::SensorCfg, slopes: &SlopeTable) -> Result<Self, GridError> {
        let grid = SensorGrid::try_from(c)?;
        Ok(Self::new(slopes, grid, f64::from(c.area_mm2)))
    }
}

// ── Offset ───────────────────────────────────────────────────────────────────

impl From<&grip_config::OffsetCfg> for OffsetEstimator {
    fn from(c: &grip_config::OffsetCfg) -> Self {
        Self::new(c.frames, Duration::from_millis(c.timeout_ms))
    }
}

/// Estimator whose per-read wait matches the serial read timeout.
impl From<&grip_config::Config> for OffsetEstimator {
    fn from(c: &grip_config::Config) -> Self {
        Self::from(&c.offset).with_poll(Duration::from_millis(c.serial.read_timeout_ms))
    }
}

// ── PID ──────────────────────────────────────────────────────────────────────

impl From<&grip_config::PidCfg> for Pid {
    fn from(c: &grip_config::PidCfg) -> Self {
        Self::new(
            f64::from(c.kp),
            f64::from(c.ki),
            f64::from(c.kd),
            f64::from(c.output_limit_nm),
        )
    }
}

// ── Scheduler ────────────────────────────────────────────────────────────────

impl From<&grip_config::SchedulerCfg> for Scheduler {
    fn from(c: &grip_config::SchedulerCfg) -> Self {
        Self::new(
            Duration::from_micros(c.period_us),
            Duration::from_micros(c.spin_margin_us),
            Duration::from_micros(c.poll_us),
        )
    }
}
