//! Collaborator seams for the gripper control stack.
//!
//! The core never talks to a serial port or a motor bus directly; it goes
//! through these traits so hardware, simulators and test doubles plug in
//! interchangeably.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Byte source for the sensor array link. Carries no framing knowledge.
pub trait Transport {
    /// Read up to `max_bytes`, blocking at most `timeout`.
    ///
    /// An empty vector means nothing arrived before the timeout; it is not an error.
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, BoxError>;

    /// Release the underlying link. Further reads may fail.
    fn close(&mut self) -> Result<(), BoxError>;
}

/// Torque-commanded actuator addressed by a numeric bus identifier.
///
/// Implementations must not buffer or coalesce commands: every call is sent.
pub trait Actuator {
    fn enable(&mut self, id: u16) -> Result<(), BoxError>;
    fn disable(&mut self, id: u16) -> Result<(), BoxError>;
    fn set_torque(&mut self, id: u16, torque_nm: f32) -> Result<(), BoxError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, BoxError> {
        (**self).read(max_bytes, timeout)
    }

    fn close(&mut self) -> Result<(), BoxError> {
        (**self).close()
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn enable(&mut self, id: u16) -> Result<(), BoxError> {
        (**self).enable(id)
    }

    fn disable(&mut self, id: u16) -> Result<(), BoxError> {
        (**self).disable(id)
    }

    fn set_torque(&mut self, id: u16, torque_nm: f32) -> Result<(), BoxError> {
        (**self).set_torque(id, torque_nm)
    }
}
