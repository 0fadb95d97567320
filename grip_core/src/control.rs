//! Per-cycle force controller.
//!
//! Every cycle takes the freshest calibrated frame, runs the PID on its
//! aggregate force and sends a torque command, whether or not a new frame
//! arrived since the last cycle. Until the first frame exists the command is 0.
use crossbeam_channel as xch;
use grip_traits::Actuator;

use crate::calibration::SensorFrame;
use crate::error::GripError;
use crate::hw_error::map_actuator_error;
use crate::pid::Pid;

/// Per-cycle snapshot for display. Never read back by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub cycle: u64,
    pub total_n: f64,
    pub target_n: f64,
    pub output_nm: f64,
    /// Sequence number of the frame used, if any.
    pub frame_seq: Option<u64>,
    /// The frame was already used by an earlier cycle.
    pub stale: bool,
}

pub struct Controller<A: Actuator> {
    actuator: A,
    id: u16,
    pid: Pid,
    target_n: f64,
    last_seq: Option<u64>,
    last_output: f64,
    enabled: bool,
    telemetry: Option<xch::Sender<Telemetry>>,
    dropped_telemetry: u64,
}

impl<A: Actuator> Controller<A> {
    pub fn new(actuator: A, id: u16, pid: Pid, target_n: f64) -> Self {
        Self {
            actuator,
            id,
            pid,
            target_n,
            last_seq: None,
            last_output: 0.0,
            enabled: false,
            telemetry: None,
            dropped_telemetry: 0,
        }
    }

    /// Publish per-cycle telemetry. Sends never block; a full channel drops the sample.
    #[must_use]
    pub fn with_telemetry(mut self, tx: xch::Sender<Telemetry>) -> Self {
        self.telemetry = Some(tx);
        self
    }

    /// Enable the actuator and start a fresh PID session.
    pub fn begin(&mut self) -> Result<(), GripError> {
        if !self.enabled {
            self.actuator
                .enable(self.id)
                .map_err(|e| map_actuator_error(e.as_ref()))?;
            self.enabled = true;
            tracing::debug!(id = self.id, "actuator enabled");
        }
        self.pid.reset();
        self.last_seq = None;
        self.last_output = 0.0;
        Ok(())
    }

    /// One control cycle. Returns the torque sent.
    pub fn cycle(&mut self, cycle: u64, frame: Option<&SensorFrame>) -> Result<f64, GripError> {
        let (output, total_n, seq, stale) = match frame {
            Some(f) => {
                let stale = self.last_seq == Some(f.seq);
                let out = self.pid.compute(self.target_n, f.total_n);
                (out, f.total_n, Some(f.seq), stale)
            }
            None => (0.0, 0.0, None, false),
        };

        #[allow(clippy::cast_possible_truncation)]
        let torque = output as f32;
        self.actuator
            .set_torque(self.id, torque)
            .map_err(|e| map_actuator_error(e.as_ref()))?;
        self.last_seq = seq;
        self.last_output = output;
        tracing::trace!(cycle, total_n, torque_nm = output, stale, "control cycle");

        self.publish(Telemetry {
            cycle,
            total_n,
            target_n: self.target_n,
            output_nm: output,
            frame_seq: seq,
            stale,
        });
        Ok(output)
    }

    fn publish(&mut self, t: Telemetry) {
        let Some(tx) = &self.telemetry else {
            return;
        };
        match tx.try_send(t) {
            Ok(()) => {}
            Err(xch::TrySendError::Full(_)) => self.dropped_telemetry += 1,
            Err(xch::TrySendError::Disconnected(_)) => {
                tracing::debug!("telemetry consumer gone");
                self.telemetry = None;
            }
        }
    }

    /// Change the force target. Resets the PID.
    pub fn set_target(&mut self, target_n: f64) {
        self.target_n = target_n;
        self.pid.reset();
    }

    /// Change gains. Resets the PID.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.pid.set_gains(kp, ki, kd);
    }

    /// Zero torque, then disable. Both steps always run; the first failure is returned.
    pub fn safe_shutdown(&mut self) -> Result<(), GripError> {
        self.last_output = 0.0;
        self.enabled = false;
        zero_and_disable(&mut self.actuator, self.id)
    }

    pub const fn target_n(&self) -> f64 {
        self.target_n
    }

    pub const fn last_output(&self) -> f64 {
        self.last_output
    }

    pub const fn dropped_telemetry(&self) -> u64 {
        self.dropped_telemetry
    }
}

/// Command zero torque, then disable the actuator.
///
/// Both steps always run; a failure is logged and the first one is returned.
pub fn zero_and_disable<A: Actuator + ?Sized>(actuator: &mut A, id: u16) -> Result<(), GripError> {
    let zero = actuator
        .set_torque(id, 0.0)
        .map_err(|e| map_actuator_error(e.as_ref()));
    if let Err(e) = &zero {
        tracing::warn!(error = %e, "zero torque failed during shutdown");
    }
    let disable = actuator
        .disable(id)
        .map_err(|e| map_actuator_error(e.as_ref()));
    if let Err(e) = &disable {
        tracing::warn!(error = %e, "actuator disable failed during shutdown");
    }
    tracing::debug!(id, "actuator zeroed and disabled");
    zero.and(disable)
}
