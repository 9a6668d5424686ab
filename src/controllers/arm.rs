//! Arm servos on the MEGA

use crate::bus::BusHandle;
use crate::config::Config;
use crate::protocol::constants::{SERVO_COUNT, SERVO_NAMES};
use crate::protocol::{pack_servo_angles, Bounds};
use parking_lot::Mutex;

pub struct ArmController {
    bus: BusHandle,
    address: u16,
    register: u8,
    limits: [Bounds; SERVO_COUNT],
    home: [i32; SERVO_COUNT],
    angles: Mutex<[i32; SERVO_COUNT]>,
}

impl ArmController {
    pub fn new(bus: BusHandle, config: &Config) -> Self {
        let limits = config.mega.servo_limits;
        let mut home = config.mega.servo_home;
        for (angle, bounds) in home.iter_mut().zip(limits.iter()) {
            *angle = bounds.clamp(*angle);
        }

        Self {
            bus,
            address: config.mega.address,
            register: config.mega.servo_register,
            limits,
            home,
            angles: Mutex::new(home),
        }
    }

    /// Move one servo (0 = base .. 4 = gripper); the others hold their angle
    pub fn set_servo_angle(&self, id: usize, angle: i32) -> bool {
        let Some(bounds) = self.limits.get(id) else {
            log::warn!("Unknown servo id {}", id);
            return false;
        };

        let angles = {
            let mut angles = self.angles.lock();
            angles[id] = bounds.clamp(angle);
            *angles
        };
        log::debug!("Servo {} -> {}", SERVO_NAMES[id], angles[id]);
        self.send(&angles)
    }

    pub fn set_servo_angles(&self, angles: [i32; SERVO_COUNT]) -> bool {
        let angles = {
            let mut current = self.angles.lock();
            for (i, angle) in angles.iter().enumerate() {
                current[i] = self.limits[i].clamp(*angle);
            }
            *current
        };
        self.send(&angles)
    }

    pub fn home(&self) -> bool {
        self.set_servo_angles(self.home)
    }

    pub fn angles(&self) -> [i32; SERVO_COUNT] {
        *self.angles.lock()
    }

    fn send(&self, angles: &[i32; SERVO_COUNT]) -> bool {
        let mut frame = pack_servo_angles(angles, &self.limits);
        frame[0] = self.register;
        let ok = self
            .bus
            .submit_write(self.address, &frame, self.bus.default_timeout());
        if !ok {
            log::warn!("Servo update {:?} failed", angles);
        }
        ok
    }
}
