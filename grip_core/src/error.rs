use thiserror::Error;

use crate::calibration::OffsetTable;

/// Terminal and resource-level failures of a control session.
#[derive(Debug, Error, Clone)]
pub enum GripError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout waiting for sensor data")]
    TransportTimeout,
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("offset estimation failed: {0}")]
    Estimate(#[from] EstimateError),
    #[error("no valid frame for {stalled_ms} ms (watchdog {threshold_ms} ms)")]
    Watchdog { stalled_ms: u64, threshold_ms: u64 },
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Outcomes of the zero-load offset estimate other than a finished table.
#[derive(Debug, Error, Clone)]
pub enum EstimateError {
    #[error("interrupted after {collected} frame(s)")]
    Interrupted { collected: usize },
    /// Some frames arrived, but not enough. `partial` is for diagnostics only.
    #[error("timed out after {collected} of {wanted} frame(s)")]
    Timeout {
        collected: usize,
        wanted: usize,
        partial: OffsetTable,
    },
    #[error("no valid frames received")]
    InsufficientData,
    #[error("transport failed during estimate: {0}")]
    Transport(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
