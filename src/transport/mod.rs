//! Transport layer for the shared I2C bus
//!
//! The bus arbiter is the only holder of an [`I2cBus`]: the handle is moved into
//! its worker thread at startup, so nothing else in the process can issue a
//! transaction.

use crate::error::Result;

#[cfg(feature = "hardware")]
mod linux;
mod mock;

#[cfg(feature = "hardware")]
pub use linux::LinuxI2cBus;
pub use mock::{MockBus, Transaction, TransactionKind};

/// Block-level I2C primitives consumed by the arbiter
pub trait I2cBus: Send {
    /// Write `data` to the device at `address`
    fn write_block(&mut self, address: u16, data: &[u8]) -> Result<()>;

    /// Read `buf.len()` bytes from `register` of the device at `address`
    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<()>;
}
