//! Linux I2C transport backed by rppal

use super::I2cBus;
use crate::error::{Error, Result};
use rppal::i2c::I2c;

/// `/dev/i2c-N` handle shared by the UNO and MEGA
pub struct LinuxI2cBus {
    i2c: I2c,
    /// Currently selected slave address (avoids an ioctl per transaction)
    selected: Option<u16>,
}

impl LinuxI2cBus {
    /// Open an I2C bus
    ///
    /// # Arguments
    /// * `bus` - Bus number (e.g., 1 for `/dev/i2c-1` on a Raspberry Pi)
    pub fn open(bus: u8) -> Result<Self> {
        let i2c = I2c::with_bus(bus)?;
        log::info!("Opened I2C bus /dev/i2c-{}", bus);
        Ok(Self {
            i2c,
            selected: None,
        })
    }

    fn select(&mut self, address: u16) -> Result<()> {
        if self.selected != Some(address) {
            self.i2c.set_slave_address(address)?;
            self.selected = Some(address);
        }
        Ok(())
    }
}

impl I2cBus for LinuxI2cBus {
    fn write_block(&mut self, address: u16, data: &[u8]) -> Result<()> {
        self.select(address)?;
        let written = self.i2c.write(data)?;
        if written != data.len() {
            return Err(Error::Bus {
                address,
                reason: format!("short write: {} of {} bytes", written, data.len()),
            });
        }
        Ok(())
    }

    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<()> {
        self.select(address)?;
        self.i2c.block_read(register, buf)?;
        Ok(())
    }
}
