//! RathIO - I2C bus arbitration and motion control for a two-board rover
//!
//! An Arduino UNO (drive motors, camera pan/tilt, front/rear rangefinders) and
//! an Arduino MEGA (side rangefinders, arm servos, RGB indicator) share one
//! I2C bus. Every transaction goes through a single arbiter thread; motion
//! commands are gated on the cached rangefinder readings.
//!
//! ## Features
//!
//! - `hardware`: rppal-backed I2C bus and BNO055 orientation sensor

pub mod bus;
pub mod cache;
pub mod config;
pub mod controllers;
pub mod error;
pub mod heading;
pub mod imu;
pub mod protocol;
pub mod robot;
pub mod server;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use imu::{MockImu, OrientationSensor};
pub use robot::{Robot, RobotStatus};
pub use server::{CommandServer, RobotCommand};
pub use transport::{I2cBus, MockBus};
