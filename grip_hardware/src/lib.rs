//! Concrete transports and actuators for the gripper.
//!
//! The serial link needs the `hardware` feature. Without it the CLI runs
//! against [`sim`], where the array and the motor share one plant model.
pub mod dry_run;
pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;

pub use dry_run::DryRunActuator;
pub use error::HwError;
#[cfg(feature = "hardware")]
pub use serial::SerialTransport;
pub use sim::{PlantParams, SimOptions, SimPlant, SimulatedActuator, SimulatedTransport};

use grip_config::{Config, SlopeTable};
use grip_core::frame::FrameLayout;

/// Simulated transport and actuator wired to one shared plant.
pub fn simulated_pair(
    cfg: &Config,
    slopes: &SlopeTable,
    opts: SimOptions,
) -> (SimulatedTransport, SimulatedActuator) {
    let plant = SimPlant::default();
    let transport = SimulatedTransport::new(
        plant.clone(),
        FrameLayout::from(&cfg.sensor),
        slopes,
        f64::from(cfg.sensor.area_mm2),
        opts,
    );
    (transport, SimulatedActuator::new(plant, cfg.actuator.id))
}
