//! Movement controller
//!
//! Every motion primitive follows the same pattern: check the cached
//! distances, update [`MotionState`](super::MotionState) under the lock, drop
//! the lock, then submit the drive frame through the arbiter. Each command
//! advances the motion epoch and guards its own write with it, so anything
//! issued before a later `stop()` is discarded if it has not hit the wire yet.

use super::kickstart::{self, KickstartHandle, Launch};
use super::safety::{self, Obstacle};
use super::state::{MotionState, MoveDirection, SharedState};
use crate::bus::{BusHandle, EpochGuard, WriteRequest};
use crate::config::{Config, KickstartConfig, SafetyConfig};
use crate::protocol::constants::DRIVE_FRAME_LEN;
use crate::protocol::{pack_drive, Bounds, DriveCommand};
use std::sync::Arc;

/// An in-flight heading correction, consumed by [`MovementController::resume_straight`]
#[derive(Debug)]
pub struct Pulse {
    guard: EpochGuard,
    resume: MoveDirection,
    speed: i32,
}

pub struct MovementController {
    bus: BusHandle,
    state: Arc<SharedState>,
    kickstart: KickstartHandle,
    address: u16,
    speed_bounds: Bounds,
    front_wheels: bool,
    rear_wheels: bool,
    safety: SafetyConfig,
    kickstart_cfg: KickstartConfig,
}

impl MovementController {
    pub fn new(
        bus: BusHandle,
        state: Arc<SharedState>,
        kickstart: KickstartHandle,
        config: &Config,
    ) -> Self {
        Self {
            bus,
            state,
            kickstart,
            address: config.uno.address,
            speed_bounds: config.motion.speed,
            front_wheels: config.uno.front_wheels,
            rear_wheels: config.uno.rear_wheels,
            safety: config.safety.clone(),
            kickstart_cfg: config.kickstart.clone(),
        }
    }

    pub fn move_forward(&self, speed: Option<i32>) -> bool {
        self.drive(MoveDirection::Forward, speed)
    }

    pub fn move_backward(&self, speed: Option<i32>) -> bool {
        self.drive(MoveDirection::Backward, speed)
    }

    pub fn tank_turn_left(&self, speed: Option<i32>) -> bool {
        self.drive(MoveDirection::TurnLeft, speed)
    }

    pub fn tank_turn_right(&self, speed: Option<i32>) -> bool {
        self.drive(MoveDirection::TurnRight, speed)
    }

    /// Unconditional stop through the safety lane
    ///
    /// Clears any pending kickstart before the frame is queued, and advances
    /// the epoch so delayed restores and heading resumes are discarded.
    pub fn stop(&self) -> bool {
        {
            let mut state = self.state.lock();
            state.kickstart = None;
            state.direction = MoveDirection::Stop;
            state.is_moving = false;
            state.current_speed = 0;
            self.state.epoch().advance();
        }
        self.kickstart.cancel();

        let frame = self.frame(MoveDirection::Stop, 0);
        let request = WriteRequest::new(self.address, &frame).safety();
        let ok = self.bus.submit_write_with(request, self.bus.default_timeout());
        if ok {
            log::info!("Stopped");
        } else {
            log::error!("Stop command was not confirmed");
        }
        ok
    }

    /// Change speed; re-sends the current direction only while driving straight
    ///
    /// Tank turns report `is_moving == false`, so a speed change during a turn
    /// is stored for the next move like one issued while stopped.
    pub fn update_speed(&self, speed: i32) -> bool {
        let (speed, direction, is_moving) = {
            let mut state = self.state.lock();
            state.target_speed = self.speed_bounds.clamp(speed);
            (state.target_speed, state.direction, state.is_moving)
        };

        if !is_moving {
            log::info!("Speed set to {} for the next move", speed);
            return true;
        }
        self.drive(direction, Some(speed))
    }

    pub fn status(&self) -> MotionState {
        self.state.snapshot()
    }

    /// Obstacle currently blocking `direction`, from the cached readings
    pub fn obstacle(&self, direction: MoveDirection) -> Option<Obstacle> {
        safety::blocked(direction, &self.bus.read_cache(), &self.safety)
    }

    /// Start a corrective turn without changing the recorded motion
    ///
    /// Returns `None` when not driving straight, while a kickstart is pending,
    /// or when the turn side is blocked.
    pub fn pulse_turn(&self, turn: MoveDirection, speed: i32) -> Option<Pulse> {
        if let Some(ob) = self.obstacle(turn) {
            log::debug!(
                "Correction {:?} skipped: {} at {} cm",
                turn,
                ob.sensor,
                ob.distance
            );
            return None;
        }

        let pulse = {
            let state = self.state.lock();
            if !state.direction.is_linear() || state.kickstart.is_some() {
                return None;
            }
            Pulse {
                guard: self.state.epoch().guard(),
                resume: state.direction,
                speed: state.current_speed,
            }
        };

        let frame = self.frame(turn, self.speed_bounds.clamp(speed));
        if self.send(&frame, Some(pulse.guard.clone())) {
            Some(pulse)
        } else {
            // The turn may still land after a timeout; queue the resume behind it
            self.resume_straight(pulse);
            None
        }
    }

    /// Return to straight motion after a pulse, unless something superseded it
    ///
    /// Stops instead if the straight path became blocked during the pulse.
    pub fn resume_straight(&self, pulse: Pulse) -> bool {
        if !pulse.guard.is_current() {
            return false;
        }
        if let Some(ob) = self.obstacle(pulse.resume) {
            log::warn!(
                "Obstacle after correction ({} at {} cm), stopping",
                ob.sensor,
                ob.distance
            );
            self.stop();
            return false;
        }

        let frame = self.frame(pulse.resume, pulse.speed);
        self.send(&frame, Some(pulse.guard))
    }

    /// Re-send the current straight motion at `speed` without touching the target speed
    pub fn cruise(&self, speed: i32) -> bool {
        let (direction, speed, guard) = {
            let mut state = self.state.lock();
            if !state.direction.is_linear() {
                return false;
            }
            state.current_speed = self.speed_bounds.clamp(speed);
            (state.direction, state.current_speed, self.state.epoch().guard())
        };
        self.send(&self.frame(direction, speed), Some(guard))
    }

    fn drive(&self, direction: MoveDirection, speed: Option<i32>) -> bool {
        if let Some(ob) = self.obstacle(direction) {
            log::warn!(
                "Refusing {:?}: {} obstacle at {} cm",
                direction,
                ob.sensor,
                ob.distance
            );
            return false;
        }

        let (speed, launch, guard) = {
            let mut state = self.state.lock();
            let speed = self.speed_bounds.clamp(speed.unwrap_or(state.target_speed));
            let launch = kickstart::plan(&self.kickstart_cfg, &mut state, direction, speed);
            state.direction = direction;
            state.is_moving = direction.is_linear();
            state.current_speed = speed;
            state.target_speed = speed;
            // A retarget rides on the breakaway already in flight
            if !matches!(launch, Launch::Retarget { .. }) {
                self.state.epoch().advance();
            }
            (speed, launch, self.state.epoch().guard())
        };

        match launch {
            Launch::Direct => self.send(&self.frame(direction, speed), Some(guard)),
            Launch::Breakaway { generation } => {
                let breakaway = self
                    .speed_bounds
                    .clamp(self.kickstart_cfg.breakaway_speed.max(speed));
                log::debug!(
                    "Kickstart {:?}: {} for {} ms, then {}",
                    direction,
                    breakaway,
                    self.kickstart_cfg.duration_ms,
                    speed
                );
                let ok = self.send(&self.frame(direction, breakaway), Some(guard));
                if ok {
                    // Armed under the lock so a retarget in between keeps its own timer
                    let state = self.state.lock();
                    if state.kickstart.map(|k| k.generation) == Some(generation) {
                        self.kickstart.arm(
                            generation,
                            self.frame(direction, speed),
                            self.kickstart_cfg.duration(),
                        );
                    }
                } else {
                    let mut state = self.state.lock();
                    if state.kickstart.map(|k| k.generation) == Some(generation) {
                        state.kickstart = None;
                    }
                }
                ok
            }
            Launch::Retarget { generation } => {
                log::debug!("Kickstart {:?} retargeted to {}", direction, speed);
                let state = self.state.lock();
                if state.kickstart.map(|k| k.generation) == Some(generation) {
                    self.kickstart.arm(
                        generation,
                        self.frame(direction, speed),
                        self.kickstart_cfg.duration(),
                    );
                }
                true
            }
        }
    }

    fn frame(&self, direction: MoveDirection, speed: i32) -> [u8; DRIVE_FRAME_LEN] {
        let cmd = DriveCommand {
            speed,
            direction: direction.wire(),
            front_wheels: self.front_wheels,
            rear_wheels: self.rear_wheels,
        };
        pack_drive(&cmd, &self.speed_bounds)
    }

    fn send(&self, frame: &[u8], guard: Option<EpochGuard>) -> bool {
        let mut request = WriteRequest::new(self.address, frame);
        if let Some(guard) = guard {
            request = request.guarded(guard);
        }
        let ok = self.bus.submit_write_with(request, self.bus.default_timeout());
        if !ok {
            log::warn!("Drive frame {:02X?} not applied", frame);
        }
        ok
    }
}
