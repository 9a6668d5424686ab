//! Shared motion state
//!
//! One mutex guards everything the movement, camera, kickstart and heading
//! components need to agree on. It is never held across a bus call: callers
//! copy what they need out, drop the guard, then submit.

use crate::bus::Epoch;
use crate::config::Config;
use crate::protocol::Direction;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;

/// Commanded motion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    #[default]
    Stop,
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

impl MoveDirection {
    /// Direction code placed on the wire
    pub fn wire(self) -> Direction {
        match self {
            MoveDirection::Stop => Direction::Stop,
            MoveDirection::Forward => Direction::Forward,
            MoveDirection::Backward => Direction::Backward,
            MoveDirection::TurnLeft => Direction::TankLeft,
            MoveDirection::TurnRight => Direction::TankRight,
        }
    }

    /// Forward/backward drive, as opposed to a pivot or standstill
    pub fn is_linear(self) -> bool {
        matches!(self, MoveDirection::Forward | MoveDirection::Backward)
    }
}

/// A breakaway pulse waiting for its restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KickstartState {
    pub generation: u64,
    pub direction: MoveDirection,
    pub target_speed: i32,
}

/// Motion and camera state guarded by [`SharedState`]
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub direction: MoveDirection,
    /// True only for forward/backward
    pub is_moving: bool,
    /// Speed currently commanded on the wire (0 when stopped)
    pub current_speed: i32,
    /// Speed used by the next move without an explicit speed
    pub target_speed: i32,
    pub pan: i32,
    pub tilt: i32,
    pub kickstart: Option<KickstartState>,
    kickstart_seq: u64,
}

impl MotionState {
    pub fn new(config: &Config) -> Self {
        Self {
            direction: MoveDirection::Stop,
            is_moving: false,
            current_speed: 0,
            target_speed: config.motion.speed.clamp(config.motion.default_speed),
            pan: config.uno.pan.clamp(config.uno.default_pan),
            tilt: config.uno.tilt.clamp(config.uno.default_tilt),
            kickstart: None,
            kickstart_seq: 0,
        }
    }

    /// Allocate a kickstart generation, invalidating any pending one
    pub fn next_kickstart_generation(&mut self) -> u64 {
        self.kickstart_seq += 1;
        self.kickstart_seq
    }
}

/// Motion state plus the epoch used to cancel delayed writes
#[derive(Debug)]
pub struct SharedState {
    motion: Mutex<MotionState>,
    epoch: Epoch,
}

impl SharedState {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            motion: Mutex::new(MotionState::new(config)),
            epoch: Epoch::new(),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, MotionState> {
        self.motion.lock()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> MotionState {
        self.motion.lock().clone()
    }

    /// Epoch advanced by every motion command
    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SharedState::new(&Config::default());
        let s = state.snapshot();
        assert_eq!(s.direction, MoveDirection::Stop);
        assert!(!s.is_moving);
        assert_eq!(s.current_speed, 0);
        assert_eq!(s.target_speed, 100);
        assert_eq!((s.pan, s.tilt), (90, 90));
        assert!(s.kickstart.is_none());
    }

    #[test]
    fn test_linear_directions() {
        assert!(MoveDirection::Forward.is_linear());
        assert!(MoveDirection::Backward.is_linear());
        assert!(!MoveDirection::TurnLeft.is_linear());
        assert!(!MoveDirection::Stop.is_linear());
        assert_eq!(MoveDirection::TurnRight.wire(), Direction::TankRight);
    }

    #[test]
    fn test_kickstart_generations_increase() {
        let mut s = MotionState::new(&Config::default());
        let a = s.next_kickstart_generation();
        let b = s.next_kickstart_generation();
        assert!(b > a);
    }
}
