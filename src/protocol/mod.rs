//! Wire protocol for the UNO (drive/camera/climate) and MEGA (arm/side sensors/RGB) boards
//!
//! Everything in here is pure: frames are built from clamped command fields and
//! read blocks are decoded into raw register values. No bus access happens here.
//!
//! # Write frames
//!
//! | Target | Register | Layout |
//! |--------|----------|--------|
//! | UNO drive | - | `speed:u16 dir:u16 90 0 front:u8 rear:u8 checksum:u8` |
//! | UNO camera | - | `speed:u16 dir:u16 pan:u16 tilt:u16` |
//! | MEGA servos | `0x31` | `0x31 a0 a1 a2 a3 a4` |
//! | MEGA RGB | `0x10` | `0x10 r g b` |
//!
//! All multi-byte fields are little-endian.
//!
//! # Read blocks (register `0x10`)
//!
//! - UNO, 12 bytes: center_front, right_rear, pan, tilt, temp×10 (i16), hum×10 (i16)
//! - MEGA, 6 bytes: left_front, right_front, left_rear

pub mod blocks;
pub mod constants;
pub mod packet;

pub use blocks::{MegaRaw, UnoRaw};
pub use packet::{
    checksum, pack_drive, pack_rgb, pack_servo_angles, pack_simple, verify_drive_frame, Bounds,
    CameraCommand, Direction, DriveCommand,
};
