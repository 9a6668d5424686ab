//! BNO055 in NDOF fusion mode over rppal I2C

use super::OrientationSensor;
use crate::error::Result;
use rppal::i2c::I2c;
use std::thread;
use std::time::Duration;

const REG_OPR_MODE: u8 = 0x3D;
const REG_EULER: u8 = 0x1A; // heading, roll, pitch (i16 LE each)

const MODE_CONFIG: u8 = 0x00;
const MODE_NDOF: u8 = 0x0C;

/// 1/16 degree per LSB
const EULER_SCALE: f32 = 16.0;

pub struct Bno055 {
    i2c: I2c,
}

impl Bno055 {
    /// Open `/dev/i2c-{bus}` and switch the sensor into fusion mode
    pub fn open(bus: u8, address: u16) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;

        i2c.smbus_write_byte(REG_OPR_MODE, MODE_CONFIG)?;
        thread::sleep(Duration::from_millis(25));
        i2c.smbus_write_byte(REG_OPR_MODE, MODE_NDOF)?;
        thread::sleep(Duration::from_millis(25));

        log::info!("BNO055 at {:#04x} on bus {} in NDOF mode", address, bus);
        Ok(Self { i2c })
    }
}

impl OrientationSensor for Bno055 {
    fn read_euler(&mut self) -> Result<(f32, f32, f32)> {
        let mut buf = [0u8; 6];
        self.i2c.block_read(REG_EULER, &mut buf)?;

        let word = |i: usize| i16::from_le_bytes([buf[i], buf[i + 1]]) as f32 / EULER_SCALE;
        let yaw = word(0);
        let roll = word(2);
        let pitch = word(4);
        Ok((roll, pitch, yaw))
    }
}
