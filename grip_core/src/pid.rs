//! Clamped PID on aggregate force.
//!
//! `output = kp·e + ki·Σe·dt + kd·Δe/dt`, clamped to `±limit`. The integral is
//! not clamped separately (no anti-windup), which keeps actuator dynamics
//! identical to the tuned hardware behaviour.
use std::sync::Arc;
use std::time::Instant;

use grip_traits::{Clock, MonotonicClock};

pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    limit: f64,
    integral: f64,
    prev_error: f64,
    prev_t: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pid")
            .field("kp", &self.kp)
            .field("ki", &self.ki)
            .field("kd", &self.kd)
            .field("limit", &self.limit)
            .field("integral", &self.integral)
            .field("prev_error", &self.prev_error)
            .finish_non_exhaustive()
    }
}

impl Pid {
    pub fn new(kp: f64, ki: f64, kd: f64, limit: f64) -> Self {
        Self::with_clock(kp, ki, kd, limit, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        kp: f64,
        ki: f64,
        kd: f64,
        limit: f64,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let prev_t = clock.now();
        Self {
            kp,
            ki,
            kd,
            limit: limit.abs(),
            integral: 0.0,
            prev_error: 0.0,
            prev_t,
            clock,
        }
    }

    /// One control update; `dt` is the time since the previous call or reset.
    pub fn compute(&mut self, target: f64, current: f64) -> f64 {
        let now = self.clock.now();
        let dt = now
            .checked_duration_since(self.prev_t)
            .map_or(0.0, |d| d.as_secs_f64());
        let error = target - current;

        self.integral += error * dt;
        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };

        let out = self.kp * error + self.ki * self.integral + self.kd * derivative;
        self.prev_error = error;
        self.prev_t = now;
        out.clamp(-self.limit, self.limit)
    }

    /// Zero the integral and previous error, and restart the time base.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_t = self.clock.now();
    }

    /// Replace gains. Resets state so old integral does not leak into new tuning.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self.reset();
    }

    pub const fn limit(&self) -> f64 {
        self.limit
    }

    pub const fn integral(&self) -> f64 {
        self.integral
    }

    pub const fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }
}
