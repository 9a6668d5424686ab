//! Camera gimbal on the UNO
//!
//! Uses the simple 8-byte frame, which also carries speed and direction, so the
//! current drive values are echoed back to keep the motors where they are.
//! The echoed values are only valid for the motion epoch they were read in, so
//! the frame carries a guard and is dropped if a stop or new move overtakes it.

use super::state::SharedState;
use crate::bus::{BusHandle, WriteRequest};
use crate::config::Config;
use crate::protocol::{pack_simple, Bounds, CameraCommand};
use std::sync::Arc;

pub struct CameraController {
    bus: BusHandle,
    state: Arc<SharedState>,
    address: u16,
    speed_bounds: Bounds,
    pan_bounds: Bounds,
    tilt_bounds: Bounds,
    default_pan: i32,
    default_tilt: i32,
}

impl CameraController {
    pub fn new(bus: BusHandle, state: Arc<SharedState>, config: &Config) -> Self {
        Self {
            bus,
            state,
            address: config.uno.address,
            speed_bounds: config.motion.speed,
            pan_bounds: config.uno.pan,
            tilt_bounds: config.uno.tilt,
            default_pan: config.uno.default_pan,
            default_tilt: config.uno.default_tilt,
        }
    }

    pub fn set_pan_tilt(&self, pan: i32, tilt: i32) -> bool {
        let (cmd, guard) = {
            let mut state = self.state.lock();
            state.pan = self.pan_bounds.clamp(pan);
            state.tilt = self.tilt_bounds.clamp(tilt);
            let cmd = CameraCommand {
                speed: state.current_speed,
                direction: state.direction.wire(),
                pan: state.pan,
                tilt: state.tilt,
            };
            (cmd, self.state.epoch().guard())
        };

        let frame = pack_simple(&cmd, &self.speed_bounds, &self.pan_bounds, &self.tilt_bounds);
        let request = WriteRequest::new(self.address, &frame).guarded(guard);
        let ok = self
            .bus
            .submit_write_with(request, self.bus.default_timeout());
        if ok {
            log::debug!("Camera at pan {} tilt {}", cmd.pan, cmd.tilt);
        } else {
            log::warn!("Camera move to pan {} tilt {} failed", cmd.pan, cmd.tilt);
        }
        ok
    }

    pub fn center(&self) -> bool {
        self.set_pan_tilt(self.default_pan, self.default_tilt)
    }

    pub fn position(&self) -> (i32, i32) {
        let state = self.state.lock();
        (state.pan, state.tilt)
    }
}
