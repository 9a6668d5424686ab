//! RGB indicator on the MEGA

use crate::bus::BusHandle;
use crate::config::Config;
use crate::protocol::pack_rgb;
use parking_lot::Mutex;

pub struct RgbController {
    bus: BusHandle,
    address: u16,
    register: u8,
    color: Mutex<[u8; 3]>,
}

impl RgbController {
    pub fn new(bus: BusHandle, config: &Config) -> Self {
        Self {
            bus,
            address: config.mega.address,
            register: config.mega.rgb_register,
            color: Mutex::new([0, 0, 0]),
        }
    }

    /// Channels are clamped to 0..=255
    pub fn set_rgb_color(&self, r: i32, g: i32, b: i32) -> bool {
        let mut frame = pack_rgb(r, g, b);
        frame[0] = self.register;
        *self.color.lock() = [frame[1], frame[2], frame[3]];

        let ok = self
            .bus
            .submit_write(self.address, &frame, self.bus.default_timeout());
        if !ok {
            log::warn!("RGB update {:?} failed", &frame[1..]);
        }
        ok
    }

    pub fn off(&self) -> bool {
        self.set_rgb_color(0, 0, 0)
    }

    pub fn color(&self) -> [u8; 3] {
        *self.color.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::fixtures::{fast_config, Rig};

    #[test]
    fn test_color_clamped_and_sent() {
        let rig = Rig::new(fast_config());
        let rgb = RgbController::new(rig.handle(), &rig.config);

        assert!(rgb.set_rgb_color(300, 128, -4));
        assert_eq!(rgb.color(), [255, 128, 0]);
        assert_eq!(
            rig.bus.writes_to(rig.config.mega.address),
            vec![vec![0x10, 255, 128, 0]]
        );

        assert!(rgb.off());
        assert_eq!(rgb.color(), [0, 0, 0]);
    }

    #[test]
    fn test_failed_write_reported() {
        let rig = Rig::new(fast_config());
        rig.bus.fail_next_writes(1);
        let rgb = RgbController::new(rig.handle(), &rig.config);

        assert!(!rgb.set_rgb_color(1, 2, 3));
    }
}
