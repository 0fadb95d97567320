use grip_traits::{Actuator, BoxError};

/// Logs every command instead of sending it. Used with a real sensor link
/// when no motor is attached.
#[derive(Debug, Default)]
pub struct DryRunActuator {
    enabled: bool,
    last_torque_nm: f32,
    commands: u64,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn last_torque_nm(&self) -> f32 {
        self.last_torque_nm
    }

    pub const fn commands(&self) -> u64 {
        self.commands
    }
}

impl Actuator for DryRunActuator {
    fn enable(&mut self, id: u16) -> Result<(), BoxError> {
        self.enabled = true;
        self.commands += 1;
        tracing::info!(id, "dry-run: enable");
        Ok(())
    }

    fn disable(&mut self, id: u16) -> Result<(), BoxError> {
        self.enabled = false;
        self.commands += 1;
        tracing::info!(id, "dry-run: disable");
        Ok(())
    }

    fn set_torque(&mut self, id: u16, torque_nm: f32) -> Result<(), BoxError> {
        self.last_torque_nm = torque_nm;
        self.commands += 1;
        tracing::debug!(id, torque_nm, enabled = self.enabled, "dry-run: torque");
        Ok(())
    }
}
