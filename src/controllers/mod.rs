//! Motion, safety and peripheral controllers
//!
//! Each controller holds a [`BusHandle`](crate::bus::BusHandle) and, where it
//! needs motion state, an `Arc<SharedState>`. None of them can reach the bus
//! directly.

mod arm;
mod camera;
mod kickstart;
mod movement;
mod rgb;
pub mod safety;
mod state;
mod watchdog;

#[cfg(test)]
pub(crate) mod fixtures;

pub use arm::ArmController;
pub use camera::CameraController;
pub use kickstart::{KickstartHandle, KickstartManager, Launch};
pub use movement::{MovementController, Pulse};
pub use rgb::RgbController;
pub use safety::{Obstacle, ObstacleFlags, Sensor};
pub use state::{KickstartState, MotionState, MoveDirection, SharedState};
pub use watchdog::Watchdog;
