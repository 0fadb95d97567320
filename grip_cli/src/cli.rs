//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective watchdog and run cap of the current session (for JSON details).
pub static LAST_SAFETY: OnceLock<CliSafety> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliSafety {
    pub watchdog_ms: u64,
    pub max_run_ms: u64,
}

#[derive(Parser, Debug)]
#[command(name = "grip", version, about = "Pressure-array gripper control")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/grip_config.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header `sensor,slope,intercept`)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); overrides logging.level, RUST_LOG overrides both
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub const fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Current
        } else {
            Self::None
        }
    }
}

/// Real-time knobs shared by the commands that drive the actuator.
#[derive(Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: locks memory, switches to SCHED_FIFO and pins the process to one CPU. Each step is best-effort; failures are logged as warnings and the run continues. Needs CAP_SYS_NICE/CAP_IPC_LOCK (or root) and a sufficient memlock ulimit.\n\nmacOS: only mlockall is applied."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority for --rt (Linux); defaults to the system maximum
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin to for --rt (Linux); defaults to 0
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate zero-load offsets, then hold the configured grip force
    Run {
        /// Force target in newtons (overrides pid.target_n)
        #[arg(long, value_name = "N", allow_negative_numbers = true)]
        target_n: Option<f32>,
        /// Proportional gain (overrides pid.kp)
        #[arg(long, allow_negative_numbers = true)]
        kp: Option<f32>,
        /// Integral gain (overrides pid.ki)
        #[arg(long, allow_negative_numbers = true)]
        ki: Option<f32>,
        /// Derivative gain (overrides pid.kd)
        #[arg(long, allow_negative_numbers = true)]
        kd: Option<f32>,
        /// Stop after this long (overrides safety.max_run_ms; 0 = until Ctrl-C)
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Sensor watchdog (overrides safety.watchdog_ms)
        #[arg(long, value_name = "MS")]
        watchdog_ms: Option<u64>,
        /// Print every Nth telemetry sample (0 = none)
        #[arg(long, value_name = "N", default_value_t = 100)]
        print_every: u64,
        #[command(flatten)]
        rt: RtArgs,
        /// Print cycle timing stats at the end
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Drive the gripper open or closed with a fixed torque
    Jog {
        /// Open (negative torque)
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "close", required_unless_present = "close")]
        open: bool,
        /// Close (positive torque)
        #[arg(long, action = ArgAction::SetTrue)]
        close: bool,
        /// Torque in Nm (defaults to actuator.open_torque_nm / close_torque_nm)
        #[arg(long, value_name = "NM", allow_negative_numbers = true)]
        torque: Option<f32>,
        /// Stop after this long (0 = until Ctrl-C)
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        duration_ms: u64,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Print the pressure grid from the live sensor stream
    Monitor {
        /// Estimate zero-load offsets first
        #[arg(long, action = ArgAction::SetTrue)]
        zero: bool,
        /// Refresh interval
        #[arg(long, value_name = "MS", default_value_t = 200)]
        every_ms: u64,
        /// Stop after this long (0 = until Ctrl-C)
        #[arg(long, value_name = "MS", default_value_t = 0)]
        duration_ms: u64,
    },
    /// Open the sensor link and wait for one valid frame
    SelfCheck,
}
