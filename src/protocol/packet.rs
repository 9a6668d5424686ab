//! Outgoing frame packing
//!
//! Fields are saturated to their configured bounds before encoding; packing never
//! fails and never panics, whatever the caller passes in. The firmware has no ack
//! path, so a frame with a bad checksum is silently ignored on the other side:
//! the checksum here must match the firmware computation exactly.

use super::constants::{
    DRIVE_FRAME_LEN, DRIVE_PAD0, DRIVE_PAD1, REG_RGB, REG_SERVO_ANGLES, RGB_FRAME_LEN,
    SERVO_COUNT, SERVO_FRAME_LEN, SIMPLE_FRAME_LEN,
};
use serde::{Deserialize, Serialize};

/// Inclusive integer range used for speeds, camera angles and servo limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

impl Bounds {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Saturate `value` into the range
    #[inline]
    pub fn clamp(&self, value: i32) -> i32 {
        value.max(self.min).min(self.max)
    }

    #[inline]
    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Midpoint, used as the neutral camera/servo position
    pub fn center(&self) -> i32 {
        self.min + (self.max - self.min) / 2
    }
}

/// Drive direction codes understood by the UNO firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Stop = 0,
    Forward = 1,
    Backward = 2,
    TankLeft = 3,
    TankRight = 4,
}

impl Direction {
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Stop),
            1 => Some(Self::Forward),
            2 => Some(Self::Backward),
            3 => Some(Self::TankLeft),
            4 => Some(Self::TankRight),
            _ => None,
        }
    }
}

/// Motion command for the 9-byte checksummed drive frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveCommand {
    pub speed: i32,
    pub direction: Direction,
    pub front_wheels: bool,
    pub rear_wheels: bool,
}

/// Command for the simple 8-byte protocol (speed, direction, pan, tilt)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraCommand {
    pub speed: i32,
    pub direction: Direction,
    pub pan: i32,
    pub tilt: i32,
}

/// Sum of all bytes modulo 256
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[inline]
fn clamp_u16(bounds: &Bounds, value: i32) -> u16 {
    bounds.clamp(value).clamp(0, u16::MAX as i32) as u16
}

/// Pack a drive command into the UNO 9-byte frame
///
/// `[speed_lo, speed_hi, dir_lo, dir_hi, 90, 0, front, rear, checksum]`
pub fn pack_drive(cmd: &DriveCommand, speed: &Bounds) -> [u8; DRIVE_FRAME_LEN] {
    let mut frame = [0u8; DRIVE_FRAME_LEN];
    frame[0..2].copy_from_slice(&clamp_u16(speed, cmd.speed).to_le_bytes());
    frame[2..4].copy_from_slice(&cmd.direction.code().to_le_bytes());
    frame[4] = DRIVE_PAD0;
    frame[5] = DRIVE_PAD1;
    frame[6] = cmd.front_wheels as u8;
    frame[7] = cmd.rear_wheels as u8;
    frame[8] = checksum(&frame[..8]);
    frame
}

/// Check the trailing checksum of a drive frame
pub fn verify_drive_frame(frame: &[u8; DRIVE_FRAME_LEN]) -> bool {
    checksum(&frame[..8]) == frame[8]
}

/// Pack the simple 4×u16 frame used for camera moves
pub fn pack_simple(
    cmd: &CameraCommand,
    speed: &Bounds,
    pan: &Bounds,
    tilt: &Bounds,
) -> [u8; SIMPLE_FRAME_LEN] {
    let mut frame = [0u8; SIMPLE_FRAME_LEN];
    frame[0..2].copy_from_slice(&clamp_u16(speed, cmd.speed).to_le_bytes());
    frame[2..4].copy_from_slice(&cmd.direction.code().to_le_bytes());
    frame[4..6].copy_from_slice(&clamp_u16(pan, cmd.pan).to_le_bytes());
    frame[6..8].copy_from_slice(&clamp_u16(tilt, cmd.tilt).to_le_bytes());
    frame
}

/// Pack the five arm servo angles, each clamped to its own limits
pub fn pack_servo_angles(
    angles: &[i32; SERVO_COUNT],
    limits: &[Bounds; SERVO_COUNT],
) -> [u8; SERVO_FRAME_LEN] {
    let mut frame = [0u8; SERVO_FRAME_LEN];
    frame[0] = REG_SERVO_ANGLES;
    for (i, (angle, bounds)) in angles.iter().zip(limits.iter()).enumerate() {
        frame[i + 1] = bounds.clamp(*angle).clamp(0, u8::MAX as i32) as u8;
    }
    frame
}

/// Pack an RGB indicator color
pub fn pack_rgb(r: i32, g: i32, b: i32) -> [u8; RGB_FRAME_LEN] {
    let channel = |v: i32| v.clamp(0, u8::MAX as i32) as u8;
    [REG_RGB, channel(r), channel(g), channel(b)]
}
