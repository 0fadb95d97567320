#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core gripper control logic (hardware-agnostic).
//!
//! All I/O goes through `grip_traits::Transport` and `grip_traits::Actuator`.
//!
//! ## Pipeline
//!
//! raw bytes → [`sync::StreamSync`] → [`frame::FrameCodec`] → raw readings →
//! [`calibration::CalibrationModel`] → [`latest::LatestFrame`] → [`control::Controller`]
//! (aggregate + [`pid::Pid`]) → actuator torque.
//!
//! [`offset::OffsetEstimator`] runs once before control to freeze the zero-load
//! offsets. [`runner::run_session`] wires the pieces together with a
//! [`reader::FrameReader`] thread and a drift-free [`scheduler::Scheduler`].

pub mod calibration;
pub mod cancel;
pub mod control;
pub mod conversions;
pub mod error;
pub mod frame;
pub mod hw_error;
pub mod jog;
pub mod latest;
pub mod mocks;
pub mod offset;
pub mod pid;
pub mod reader;
pub mod runner;
pub mod scheduler;
pub mod sync;
pub mod util;

pub use calibration::{CalibrationModel, GridError, OffsetTable, Reading, SensorFrame, SensorGrid};
pub use cancel::{CancelToken, StopReason};
pub use control::{Controller, Telemetry};
pub use error::{BuildError, EstimateError, GripError, Result};
pub use frame::{DecodeError, FrameCodec, FrameLayout, RawFrame};
pub use latest::LatestFrame;
pub use offset::OffsetEstimator;
pub use pid::Pid;
pub use runner::{SessionParams, SessionReport, run_session};
pub use scheduler::{CycleStats, Scheduler, Tick};
pub use sync::{StreamSync, SyncEvent, SyncStats};
