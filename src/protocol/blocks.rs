//! Decoding of the raw sensor read blocks
//!
//! These are the register values exactly as the firmware reports them.
//! Validation (zero/overflow distances, out-of-range angles) happens in
//! [`crate::cache`], never here.

use super::constants::{MEGA_READ_LEN, UNO_READ_LEN};
use crate::error::{Error, Result};

#[inline]
fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn i16_at(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

fn check_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(Error::InvalidFrame {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// UNO sensor block (12 bytes at register 0x10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnoRaw {
    pub center_front: u16,
    pub right_rear: u16,
    pub pan: u16,
    pub tilt: u16,
    /// Temperature in tenths of a degree C
    pub temperature_x10: i16,
    /// Relative humidity in tenths of a percent
    pub humidity_x10: i16,
}

impl UnoRaw {
    pub fn parse(data: &[u8]) -> Result<Self> {
        check_len(data, UNO_READ_LEN)?;
        Ok(Self {
            center_front: u16_at(data, 0),
            right_rear: u16_at(data, 2),
            pan: u16_at(data, 4),
            tilt: u16_at(data, 6),
            temperature_x10: i16_at(data, 8),
            humidity_x10: i16_at(data, 10),
        })
    }

    /// Inverse of [`UnoRaw::parse`], used to script mock peripherals
    pub fn to_bytes(&self) -> [u8; UNO_READ_LEN] {
        let mut out = [0u8; UNO_READ_LEN];
        out[0..2].copy_from_slice(&self.center_front.to_le_bytes());
        out[2..4].copy_from_slice(&self.right_rear.to_le_bytes());
        out[4..6].copy_from_slice(&self.pan.to_le_bytes());
        out[6..8].copy_from_slice(&self.tilt.to_le_bytes());
        out[8..10].copy_from_slice(&self.temperature_x10.to_le_bytes());
        out[10..12].copy_from_slice(&self.humidity_x10.to_le_bytes());
        out
    }
}

/// MEGA side-sensor block (6 bytes at register 0x10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MegaRaw {
    pub left_front: u16,
    pub right_front: u16,
    pub left_rear: u16,
}

impl MegaRaw {
    pub fn parse(data: &[u8]) -> Result<Self> {
        check_len(data, MEGA_READ_LEN)?;
        Ok(Self {
            left_front: u16_at(data, 0),
            right_front: u16_at(data, 2),
            left_rear: u16_at(data, 4),
        })
    }

    /// Inverse of [`MegaRaw::parse`], used to script mock peripherals
    pub fn to_bytes(&self) -> [u8; MEGA_READ_LEN] {
        let mut out = [0u8; MEGA_READ_LEN];
        out[0..2].copy_from_slice(&self.left_front.to_le_bytes());
        out[2..4].copy_from_slice(&self.right_front.to_le_bytes());
        out[4..6].copy_from_slice(&self.left_rear.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uno_block() {
        // 42cm, 120cm, pan 90, tilt 45, -3.5C, 61.2%
        let data = [42, 0, 120, 0, 90, 0, 45, 0, 0xDD, 0xFF, 0x64, 0x02];
        let raw = UnoRaw::parse(&data).unwrap();
        assert_eq!(raw.center_front, 42);
        assert_eq!(raw.right_rear, 120);
        assert_eq!(raw.pan, 90);
        assert_eq!(raw.tilt, 45);
        assert_eq!(raw.temperature_x10, -35);
        assert_eq!(raw.humidity_x10, 612);
    }

    #[test]
    fn test_parse_mega_block() {
        let data = [0x2C, 0x01, 15, 0, 0, 0];
        let raw = MegaRaw::parse(&data).unwrap();
        assert_eq!(raw.left_front, 300);
        assert_eq!(raw.right_front, 15);
        assert_eq!(raw.left_rear, 0);
    }

    #[test]
    fn test_short_block_rejected() {
        assert!(matches!(
            UnoRaw::parse(&[0u8; 11]),
            Err(Error::InvalidFrame {
                expected: 12,
                actual: 11
            })
        ));
        assert!(MegaRaw::parse(&[0u8; 4]).is_err());
    }
}
