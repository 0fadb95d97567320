//! Test and helper doubles for grip_core.
//!
//! Transport and actuator doubles can share one [`CallLog`], so tests can
//! assert the relative order of actuator commands and transport close.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use grip_traits::{Actuator, BoxError, Transport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    Enable(u16),
    Disable(u16),
    Torque(u16, f32),
    Read,
    Close,
}

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, c: Call) {
        if let Ok(mut v) = self.0.lock() {
            v.push(c);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Calls other than `Read`, which are too numerous to assert on.
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Read))
            .collect()
    }
}

/// Plays back byte chunks, one per read. When exhausted, either idles
/// (sleeping the read timeout and returning nothing) or repeats the last
/// `repeat` chunks forever.
pub struct ScriptedTransport {
    chunks: VecDeque<Vec<u8>>,
    repeat: Vec<Vec<u8>>,
    cursor: usize,
    fail_after: Option<usize>,
    reads: usize,
    log: CallLog,
}

impl ScriptedTransport {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>, log: CallLog) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            repeat: Vec::new(),
            cursor: 0,
            fail_after: None,
            reads: 0,
            log,
        }
    }

    /// After the script runs out, cycle through `chunks` forever.
    #[must_use]
    pub fn then_repeat(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.repeat = chunks;
        self
    }

    /// Return an I/O error on every read after the first `n`.
    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, _max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, BoxError> {
        self.log.push(Call::Read);
        if let Some(n) = self.fail_after
            && self.reads >= n
        {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted link failure",
            )));
        }
        self.reads += 1;
        if let Some(c) = self.chunks.pop_front() {
            return Ok(c);
        }
        if !self.repeat.is_empty() {
            let c = self.repeat[self.cursor % self.repeat.len()].clone();
            self.cursor += 1;
            // Pace like a real link so the reader does not spin.
            std::thread::sleep(Duration::from_millis(1).min(timeout));
            return Ok(c);
        }
        std::thread::sleep(timeout);
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.log.push(Call::Close);
        Ok(())
    }
}

/// Records every command; optionally fails torque commands after `n` successes,
/// or refuses enable/disable outright.
pub struct RecordingActuator {
    log: CallLog,
    fail_torque_after: Option<usize>,
    fail_enable: bool,
    fail_disable: bool,
    torques: usize,
}

impl RecordingActuator {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_torque_after: None,
            fail_enable: false,
            fail_disable: false,
            torques: 0,
        }
    }

    #[must_use]
    pub fn fail_torque_after(mut self, n: usize) -> Self {
        self.fail_torque_after = Some(n);
        self
    }

    #[must_use]
    pub fn fail_enable(mut self) -> Self {
        self.fail_enable = true;
        self
    }

    #[must_use]
    pub fn fail_disable(mut self) -> Self {
        self.fail_disable = true;
        self
    }
}

impl Actuator for RecordingActuator {
    fn enable(&mut self, id: u16) -> Result<(), BoxError> {
        if self.fail_enable {
            return Err("motor refused enable".into());
        }
        self.log.push(Call::Enable(id));
        Ok(())
    }

    fn disable(&mut self, id: u16) -> Result<(), BoxError> {
        if self.fail_disable {
            return Err("motor refused disable".into());
        }
        self.log.push(Call::Disable(id));
        Ok(())
    }

    fn set_torque(&mut self, id: u16, torque_nm: f32) -> Result<(), BoxError> {
        // Zero is always accepted so shutdown can be observed after a fault.
        if torque_nm != 0.0
            && let Some(n) = self.fail_torque_after
            && self.torques >= n
        {
            return Err("actuator rejected torque command".into());
        }
        self.torques += 1;
        self.log.push(Call::Torque(id, torque_nm));
        Ok(())
    }
}
