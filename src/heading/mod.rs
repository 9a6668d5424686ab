//! Heading hold
//!
//! Skid-steer drive has no continuous steering, so heading error is corrected
//! with short timed tank turns. [`HeadingController`] turns orientation into
//! rate-limited pulse decisions; [`HeadingHoldService`] executes them through
//! the movement controller and also runs the [`UphillBoost`] heuristic.

mod controller;
mod pid;
mod service;
mod uphill;

pub use controller::{normalize_angle, Correction, HeadingController, HeadingDecision};
pub use pid::PidController;
pub use service::{HeadingHoldService, HeadingStatus, HoldState};
pub use uphill::{BoostAction, UphillBoost};
