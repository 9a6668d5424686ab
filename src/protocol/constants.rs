//! Register map and wire constants shared with the UNO/MEGA firmware

// Default 7-bit addresses
pub const DEFAULT_UNO_ADDRESS: u16 = 0x08;
pub const DEFAULT_MEGA_ADDRESS: u16 = 0x09;

// Registers
pub const REG_SENSOR_BLOCK: u8 = 0x10; // Sensor read block (both boards)
pub const REG_SERVO_ANGLES: u8 = 0x31; // MEGA arm servo angles
pub const REG_RGB: u8 = 0x10; // MEGA RGB indicator

// Block sizes
pub const UNO_READ_LEN: usize = 12;
pub const MEGA_READ_LEN: usize = 6;
pub const DRIVE_FRAME_LEN: usize = 9;
pub const SIMPLE_FRAME_LEN: usize = 8;
pub const SERVO_FRAME_LEN: usize = 6;
pub const RGB_FRAME_LEN: usize = 4;

// Drive frame padding bytes (firmware expects these literally)
pub const DRIVE_PAD0: u8 = 90;
pub const DRIVE_PAD1: u8 = 0;

/// Number of arm servos on the MEGA (base, shoulder, elbow, wrist, gripper)
pub const SERVO_COUNT: usize = 5;

/// Servo names in wire order
pub const SERVO_NAMES: [&str; SERVO_COUNT] = ["base", "shoulder", "elbow", "wrist", "gripper"];

/// Wire-level "no valid reading" marker for distance channels
pub const SENSOR_ERROR: u16 = 999;
