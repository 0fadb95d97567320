//! Simulated sensor array and actuator.
//!
//! Both halves share one [`SimPlant`]: torque from the actuator moves the
//! fingers, and once they pass the contact point the array sees a force
//! proportional to how far they pressed in. Frames are encoded exactly like
//! the hardware's, so everything downstream of the transport runs unchanged.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use grip_config::SlopeTable;
use grip_core::frame::{FrameLayout, encode};
use grip_traits::{Actuator, BoxError, Transport};

use crate::error::HwError;

/// Transport yields no bytes at all.
pub const ENV_SILENT: &str = "GRIP_TEST_SIM_SILENT";
/// Transport fails every read after this many.
pub const ENV_FAIL_AFTER: &str = "GRIP_TEST_SIM_FAIL_AFTER";
/// Garbage bytes before every Nth frame.
pub const ENV_NOISE: &str = "GRIP_TEST_SIM_NOISE";

const GARBAGE: [u8; 3] = [0x00, 0xFF, 0x13];
const ADC_MAX: f64 = 4095.0;

#[derive(Debug, Clone, Copy)]
pub struct PlantParams {
    /// Closure (0 = open, 1 = shut) at which the fingers touch the object.
    pub contact_at: f64,
    /// Force per unit of closure past contact (N).
    pub stiffness_n: f64,
    /// Closure rate per newton-metre of torque (1/s).
    pub speed_per_nm: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            contact_at: 0.4,
            stiffness_n: 20.0,
            speed_per_nm: 1.0,
        }
    }
}

#[derive(Debug)]
struct PlantState {
    enabled: bool,
    torque_nm: f64,
    closure: f64,
    last: Instant,
}

/// Shared state of the simulated gripper.
#[derive(Debug, Clone)]
pub struct SimPlant {
    state: Arc<Mutex<PlantState>>,
    params: PlantParams,
}

impl SimPlant {
    pub fn new(params: PlantParams) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState {
                enabled: false,
                torque_nm: 0.0,
                closure: 0.0,
                last: Instant::now(),
            })),
            params,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PlantState, &PlantParams) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let dt = now.saturating_duration_since(guard.last).as_secs_f64();
        guard.last = now;
        if guard.enabled {
            let c = guard.closure + guard.torque_nm * self.params.speed_per_nm * dt;
            guard.closure = c.clamp(0.0, 1.0);
        }
        f(&mut *guard, &self.params)
    }

    /// Current contact force (N).
    pub fn force_n(&self) -> f64 {
        self.with_state(|s, p| (s.closure - p.contact_at).max(0.0) * p.stiffness_n)
    }

    pub fn closure(&self) -> f64 {
        self.with_state(|s, _| s.closure)
    }

    pub fn is_enabled(&self) -> bool {
        self.with_state(|s, _| s.enabled)
    }

    pub fn torque_nm(&self) -> f64 {
        self.with_state(|s, _| s.torque_nm)
    }

    /// Place the fingers directly, e.g. already in contact for a test.
    pub fn set_closure(&self, closure: f64) {
        self.with_state(|s, _| s.closure = closure.clamp(0.0, 1.0));
    }

    fn set_enabled(&self, enabled: bool) {
        self.with_state(|s, _| {
            s.enabled = enabled;
            if !enabled {
                s.torque_nm = 0.0;
            }
        });
    }

    /// Returns false when the motor is disabled and the command was ignored.
    fn command(&self, torque_nm: f64) -> bool {
        self.with_state(|s, _| {
            if s.enabled {
                s.torque_nm = torque_nm;
            }
            s.enabled
        })
    }
}

impl Default for SimPlant {
    fn default() -> Self {
        Self::new(PlantParams::default())
    }
}

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub frame_period: Duration,
    /// ADC value of an unloaded sensor.
    pub baseline_raw: u16,
    pub silent: bool,
    pub fail_after: Option<usize>,
    /// Inject garbage before every Nth frame; 0 disables.
    pub noise_every: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            frame_period: Duration::from_millis(5),
            baseline_raw: 300,
            silent: false,
            fail_after: None,
            noise_every: 0,
        }
    }
}

impl SimOptions {
    /// Defaults overridden by the `GRIP_TEST_SIM_*` variables.
    pub fn from_env() -> Self {
        let mut o = Self::default();
        if let Ok(v) = std::env::var(ENV_SILENT) {
            o.silent = !matches!(v.trim(), "" | "0" | "false");
        }
        if let Ok(v) = std::env::var(ENV_FAIL_AFTER)
            && let Ok(n) = v.trim().parse::<usize>()
        {
            o.fail_after = Some(n);
        }
        if let Ok(v) = std::env::var(ENV_NOISE)
            && let Ok(n) = v.trim().parse::<u64>()
        {
            o.noise_every = n;
        }
        o
    }
}

/// Byte stream of a simulated sensor array.
///
/// Frames are produced at `frame_period` in wall-clock time; a read blocks
/// until the next frame is due or the timeout expires.
pub struct SimulatedTransport {
    plant: SimPlant,
    layout: FrameLayout,
    opts: SimOptions,
    /// Raw counts per newton for each sensor, centre-weighted.
    counts_per_n: Vec<f64>,
    pending: VecDeque<u8>,
    next_due: Instant,
    frames: u64,
    reads: usize,
    closed: bool,
}

impl SimulatedTransport {
    pub fn new(
        plant: SimPlant,
        layout: FrameLayout,
        slopes: &SlopeTable,
        area_mm2: f64,
        opts: SimOptions,
    ) -> Self {
        let n = layout.sensor_count;
        let side = grip_config::grid_side(n).unwrap_or(1).max(1);
        #[allow(clippy::cast_precision_loss)]
        let centre = (side as f64 - 1.0) / 2.0;
        #[allow(clippy::cast_precision_loss)]
        let weights: Vec<f64> = (0..n)
            .map(|i| {
                let dx = (i % side) as f64 - centre;
                let dy = (i / side) as f64 - centre;
                1.0 / (1.0 + dx * dx + dy * dy)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let area_m2 = area_mm2 * 1e-6;
        let counts_per_n = weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let share = w / total;
                match slopes.get(i + 1) {
                    // kPa per newton on this pad, then counts per kPa.
                    Some(slope) if slope > 0.0 => share / (1000.0 * area_m2) / slope,
                    _ => 0.0,
                }
            })
            .collect();
        tracing::debug!(sensors = n, period_us = opts.frame_period.as_micros(), "simulated array ready");
        Self {
            plant,
            layout,
            opts,
            counts_per_n,
            pending: VecDeque::new(),
            next_due: Instant::now(),
            frames: 0,
            reads: 0,
            closed: false,
        }
    }

    pub fn plant(&self) -> &SimPlant {
        &self.plant
    }

    pub const fn frames_sent(&self) -> u64 {
        self.frames
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn readings(&self) -> Vec<u16> {
        let force = self.plant.force_n();
        let base = f64::from(self.opts.baseline_raw);
        self.counts_per_n
            .iter()
            .map(|k| (base + force * k).round().clamp(0.0, ADC_MAX) as u16)
            .collect()
    }

    fn produce_due(&mut self, now: Instant) -> Result<(), HwError> {
        // Never queue more than a handful of frames after a long pause.
        if now.saturating_duration_since(self.next_due) > self.opts.frame_period * 8 {
            self.next_due = now;
        }
        while self.next_due <= now {
            self.frames += 1;
            if self.opts.noise_every > 0 && self.frames % self.opts.noise_every == 0 {
                self.pending.extend(GARBAGE);
            }
            let bytes = encode(&self.layout, 0, &self.readings())
                .map_err(|e| HwError::Serial(e.to_string()))?;
            self.pending.extend(bytes);
            self.next_due += self.opts.frame_period;
        }
        Ok(())
    }
}

impl Transport for SimulatedTransport {
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, BoxError> {
        if self.closed {
            return Err(Box::new(HwError::Closed));
        }
        if let Some(n) = self.opts.fail_after
            && self.reads >= n
        {
            return Err(Box::new(HwError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated link lost",
            ))));
        }
        self.reads += 1;
        if self.opts.silent {
            std::thread::sleep(timeout);
            return Ok(Vec::new());
        }

        if self.pending.is_empty() {
            let now = Instant::now();
            if self.next_due > now {
                let wait = self.next_due - now;
                if wait > timeout {
                    std::thread::sleep(timeout);
                    return Ok(Vec::new());
                }
                std::thread::sleep(wait);
            }
            self.produce_due(Instant::now())?;
        }

        let n = max_bytes.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.closed = true;
        self.pending.clear();
        tracing::debug!(frames = self.frames, "simulated array closed");
        Ok(())
    }
}

/// Motor half of the simulation. Commands while disabled are ignored.
pub struct SimulatedActuator {
    plant: SimPlant,
    id: u16,
}

impl SimulatedActuator {
    pub const fn new(plant: SimPlant, id: u16) -> Self {
        Self { plant, id }
    }

    fn check_id(&self, id: u16) -> Result<(), HwError> {
        if id == self.id {
            Ok(())
        } else {
            Err(HwError::Actuator(format!("no motor with id {id} (have {})", self.id)))
        }
    }
}

impl Actuator for SimulatedActuator {
    fn enable(&mut self, id: u16) -> Result<(), BoxError> {
        self.check_id(id)?;
        self.plant.set_enabled(true);
        tracing::debug!(id, "simulated motor enabled");
        Ok(())
    }

    fn disable(&mut self, id: u16) -> Result<(), BoxError> {
        self.check_id(id)?;
        self.plant.set_enabled(false);
        tracing::debug!(id, "simulated motor disabled");
        Ok(())
    }

    fn set_torque(&mut self, id: u16, torque_nm: f32) -> Result<(), BoxError> {
        self.check_id(id)?;
        if !torque_nm.is_finite() {
            return Err(Box::new(HwError::Actuator(format!("non-finite torque {torque_nm}"))));
        }
        if !self.plant.command(f64::from(torque_nm)) && torque_nm != 0.0 {
            tracing::trace!(id, torque_nm, "torque ignored while disabled");
        }
        Ok(())
    }
}
