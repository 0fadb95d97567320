#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration table parsing for the gripper controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The slope CSV loader enforces headers and per-sensor sanity checks.
//! - `default_slopes()` carries the factory table for the 36-cell array.
use serde::Deserialize;

pub mod calibration;

pub use calibration::{
    CalibrationRow, SlopeTable, default_rows, default_slopes, load_calibration_csv,
};

/// Frame marker used by the pressure array firmware.
pub const DEFAULT_HEADER: [u8; 2] = [0xFF, 0x66];
/// Number of cells on the stock 6x6 array.
pub const DEFAULT_SENSOR_COUNT: usize = 36;
/// Largest array accepted by `validate()` (a 32x32 grid).
pub const MAX_SENSOR_COUNT: usize = 1024;

#[derive(Debug, Deserialize)]
pub struct SerialCfg {
    /// Device path, e.g. /dev/ttyUSB0
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Upper bound on a single blocking read (ms)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Bytes requested per read; must cover at least one frame
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
}

fn default_baud() -> u32 {
    460_800
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_read_chunk() -> usize {
    2 * frame_size(DEFAULT_SENSOR_COUNT)
}

/// Byte length of one frame for `sensor_count` cells:
/// 2 header + 2 reserved + 2 per cell + 2 checksum.
///
/// Saturates instead of overflowing; `validate()` bounds the count first.
pub const fn frame_size(sensor_count: usize) -> usize {
    sensor_count.saturating_mul(2).saturating_add(6)
}

/// Which physical corner sensor 1 sits in, along the y axis.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Sensor 1 at (0, side-1); rows count downwards in y.
    #[default]
    BottomUp,
    /// Sensor 1 at (0, 0).
    TopDown,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    pub header: [u8; 2],
    pub sensor_count: usize,
    /// Contact area of one cell in mm²
    pub area_mm2: f32,
    pub row_order: RowOrder,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER,
            sensor_count: DEFAULT_SENSOR_COUNT,
            area_mm2: 2.5 * 2.5,
            row_order: RowOrder::BottomUp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OffsetCfg {
    /// Zero-load frames averaged per sensor
    pub frames: usize,
    /// Wall-clock budget for the whole estimate (ms)
    pub timeout_ms: u64,
}

impl Default for OffsetCfg {
    fn default() -> Self {
        Self {
            frames: 10,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Symmetric clamp on the torque command (N·m)
    pub output_limit_nm: f32,
    /// Default aggregate force target (N)
    pub target_n: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.1,
            kd: 0.0,
            output_limit_nm: 0.5,
            target_n: 0.15,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    pub period_us: u64,
    /// Remaining time below which coarse sleeping stops and polling starts
    pub spin_margin_us: u64,
    /// Longest single sleep between cancellation checks
    pub poll_us: u64,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            period_us: 10_000,
            spin_margin_us: 500,
            poll_us: 1_000,
        }
    }
}

/// Motor models supported by the bus driver.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum MotorKind {
    #[serde(rename = "dm3507")]
    Dm3507,
    #[default]
    #[serde(rename = "dm4310")]
    Dm4310,
    #[serde(rename = "dm4310_48v")]
    Dm4310V48,
    #[serde(rename = "dm4340")]
    Dm4340,
    #[serde(rename = "dm4340_48v")]
    Dm4340V48,
    #[serde(rename = "dm6006")]
    Dm6006,
    #[serde(rename = "dm6248")]
    Dm6248,
    #[serde(rename = "dm8006")]
    Dm8006,
    #[serde(rename = "dm8009")]
    Dm8009,
    #[serde(rename = "dm10010l")]
    Dm10010L,
    #[serde(rename = "dm10010")]
    Dm10010,
    #[serde(rename = "dmh3510")]
    Dmh3510,
    #[serde(rename = "dmh6215")]
    Dmh6215,
    #[serde(rename = "dms3519")]
    Dms3519,
    #[serde(rename = "dmg6220")]
    Dmg6220,
}

/// Motor control modes; only `Mit` carries a direct torque term.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    Mit,
    PosVel,
    Vel,
    PosForce,
}

impl ControlMode {
    /// CAN id offset the driver adds for frames in this mode.
    pub const fn id_offset(self) -> u16 {
        match self {
            Self::Mit => 0x000,
            Self::PosVel => 0x100,
            Self::Vel => 0x200,
            Self::PosForce => 0x300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActuatorCfg {
    pub id: u16,
    pub master_id: u16,
    pub kind: MotorKind,
    pub mode: ControlMode,
    /// Manual jog torque for opening (N·m, <= 0)
    pub open_torque_nm: f32,
    /// Manual jog torque for closing (N·m, >= 0)
    pub close_torque_nm: f32,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            id: 0x01,
            master_id: 0x11,
            kind: MotorKind::Dm4310,
            mode: ControlMode::Mit,
            open_torque_nm: -0.25,
            close_torque_nm: 0.15,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Safety {
    /// Stop if no valid frame arrives for this long (ms). 0 derives it from timing.
    pub watchdog_ms: u64,
    /// Hard cap on a control session (ms). 0 = run until stopped.
    pub max_run_ms: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub serial: SerialCfg,
    #[serde(default)]
    pub sensor: SensorCfg,
    #[serde(default)]
    pub offset: OffsetCfg,
    #[serde(default)]
    pub pid: PidCfg,
    #[serde(default)]
    pub scheduler: SchedulerCfg,
    #[serde(default)]
    pub actuator: ActuatorCfg,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Integer square root when `n` is a perfect square.
pub fn grid_side(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let side = n.isqrt();
    (side.checked_mul(side) == Some(n)).then_some(side)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if self.serial.baud_rate == 0 {
            eyre::bail!("serial.baud_rate must be > 0");
        }
        if self.serial.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }

        // Sensor
        if self.sensor.sensor_count > MAX_SENSOR_COUNT {
            eyre::bail!(
                "sensor.sensor_count must be <= {MAX_SENSOR_COUNT}, got {}",
                self.sensor.sensor_count
            );
        }
        if grid_side(self.sensor.sensor_count).is_none() {
            eyre::bail!(
                "sensor.sensor_count must be a non-zero perfect square, got {}",
                self.sensor.sensor_count
            );
        }
        let frame = frame_size(self.sensor.sensor_count);
        if self.serial.read_chunk < frame {
            eyre::bail!("serial.read_chunk must be >= one frame ({frame} bytes)");
        }
        if !(self.sensor.area_mm2.is_finite() && self.sensor.area_mm2 > 0.0) {
            eyre::bail!("sensor.area_mm2 must be > 0");
        }

        // Offset estimation
        if self.offset.frames == 0 {
            eyre::bail!("offset.frames must be >= 1");
        }
        if self.offset.timeout_ms == 0 {
            eyre::bail!("offset.timeout_ms must be >= 1");
        }

        // PID
        for (name, v) in [
            ("pid.kp", self.pid.kp),
            ("pid.ki", self.pid.ki),
            ("pid.kd", self.pid.kd),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("{name} must be finite and >= 0");
            }
        }
        if !(self.pid.output_limit_nm.is_finite() && self.pid.output_limit_nm > 0.0) {
            eyre::bail!("pid.output_limit_nm must be > 0");
        }
        if !self.pid.target_n.is_finite() {
            eyre::bail!("pid.target_n must be finite");
        }

        // Scheduler
        if self.scheduler.period_us == 0 {
            eyre::bail!("scheduler.period_us must be > 0");
        }
        if self.scheduler.spin_margin_us >= self.scheduler.period_us {
            eyre::bail!("scheduler.spin_margin_us must be < scheduler.period_us");
        }
        if self.scheduler.poll_us == 0 {
            eyre::bail!("scheduler.poll_us must be >= 1");
        }

        // Actuator jog torques
        let limit = self.pid.output_limit_nm;
        if !self.actuator.open_torque_nm.is_finite() || self.actuator.open_torque_nm > 0.0 {
            eyre::bail!("actuator.open_torque_nm must be <= 0");
        }
        if !self.actuator.close_torque_nm.is_finite() || self.actuator.close_torque_nm < 0.0 {
            eyre::bail!("actuator.close_torque_nm must be >= 0");
        }
        if self.actuator.open_torque_nm.abs() > limit || self.actuator.close_torque_nm > limit {
            eyre::bail!("actuator jog torques must be within pid.output_limit_nm ({limit})");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r}");
        }

        Ok(())
    }
}
