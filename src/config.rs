//! Configuration for RathIO
//!
//! Loaded from a TOML file. Every field has a default, so a partial (or empty)
//! file only needs to name what differs from the stock rover.
//!
//! ```toml
//! [bus]
//! i2c_bus = 1
//! write_cooldown_ms = 15
//!
//! [uno]
//! address = 8
//! read_period_ms = 200
//!
//! [safety]
//! front_center_stop_cm = 25
//! ```

use crate::error::{Error, Result};
use crate::protocol::constants::{
    DEFAULT_MEGA_ADDRESS, DEFAULT_UNO_ADDRESS, REG_RGB, REG_SENSOR_BLOCK, REG_SERVO_ANGLES,
    SERVO_COUNT, SERVO_NAMES,
};
use crate::protocol::Bounds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub uno: UnoConfig,
    #[serde(default)]
    pub mega: MegaConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub kickstart: KickstartConfig,
    #[serde(default)]
    pub heading: HeadingConfig,
    #[serde(default)]
    pub uphill: UphillConfig,
    #[serde(default)]
    pub imu: ImuConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shared I2C bus and arbiter timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BusConfig {
    /// Linux I2C bus number (`/dev/i2c-N`)
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// Quiet time after every write so the addressed board can process it
    #[serde(default = "default_write_cooldown_ms")]
    pub write_cooldown_ms: u64,

    /// Extra gap before talking to a different address than the last transaction
    #[serde(default = "default_inter_device_delay_ms")]
    pub inter_device_delay_ms: u64,

    /// Arbiter loop rate cap
    #[serde(default = "default_loop_hz")]
    pub loop_hz: u32,

    /// Capacity of each write lane
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Default time a caller waits for its write to execute
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Log every Nth consecutive read failure per peripheral (the first is always logged)
    #[serde(default = "default_read_failure_log_every")]
    pub read_failure_log_every: u32,
}

fn default_i2c_bus() -> u8 {
    1
}
fn default_write_cooldown_ms() -> u64 {
    15
}
fn default_inter_device_delay_ms() -> u64 {
    10
}
fn default_loop_hz() -> u32 {
    50
}
fn default_queue_capacity() -> usize {
    32
}
fn default_write_timeout_ms() -> u64 {
    500
}
fn default_read_failure_log_every() -> u32 {
    25
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            write_cooldown_ms: default_write_cooldown_ms(),
            inter_device_delay_ms: default_inter_device_delay_ms(),
            loop_hz: default_loop_hz(),
            queue_capacity: default_queue_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
            read_failure_log_every: default_read_failure_log_every(),
        }
    }
}

impl BusConfig {
    pub fn write_cooldown(&self) -> Duration {
        Duration::from_millis(self.write_cooldown_ms)
    }

    pub fn inter_device_delay(&self) -> Duration {
        Duration::from_millis(self.inter_device_delay_ms)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.loop_hz.max(1) as u64)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Peripheral A: drive motors, front/rear-center sensors, camera gimbal, climate
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UnoConfig {
    pub address: u16,
    pub read_register: u8,
    pub read_period_ms: u64,
    /// Distances of 0 or above this are treated as invalid
    pub max_valid_distance: u16,
    pub front_wheels: bool,
    pub rear_wheels: bool,
    pub pan: Bounds,
    pub tilt: Bounds,
    pub default_pan: i32,
    pub default_tilt: i32,
}

impl Default for UnoConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_UNO_ADDRESS,
            read_register: REG_SENSOR_BLOCK,
            read_period_ms: 200,
            max_valid_distance: 500,
            front_wheels: true,
            rear_wheels: true,
            pan: Bounds::new(0, 180),
            tilt: Bounds::new(0, 180),
            default_pan: 90,
            default_tilt: 90,
        }
    }
}

impl UnoConfig {
    pub fn read_period(&self) -> Duration {
        Duration::from_millis(self.read_period_ms)
    }
}

/// Peripheral B: side sensors, arm servos, RGB indicator
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MegaConfig {
    pub address: u16,
    pub read_register: u8,
    pub read_period_ms: u64,
    pub max_valid_distance: u16,
    pub servo_register: u8,
    pub rgb_register: u8,
    /// Per-joint limits in wire order (base, shoulder, elbow, wrist, gripper)
    pub servo_limits: [Bounds; SERVO_COUNT],
    pub servo_home: [i32; SERVO_COUNT],
}

impl Default for MegaConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_MEGA_ADDRESS,
            read_register: REG_SENSOR_BLOCK,
            read_period_ms: 200,
            max_valid_distance: 500,
            servo_register: REG_SERVO_ANGLES,
            rgb_register: REG_RGB,
            servo_limits: [
                Bounds::new(0, 180),
                Bounds::new(15, 165),
                Bounds::new(0, 180),
                Bounds::new(0, 180),
                Bounds::new(10, 90),
            ],
            servo_home: [90, 90, 90, 90, 45],
        }
    }
}

impl MegaConfig {
    pub fn read_period(&self) -> Duration {
        Duration::from_millis(self.read_period_ms)
    }
}

/// Speed limits and the autostop watchdog
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    pub speed: Bounds,
    /// Speed used when a move names none and nothing was armed
    pub default_speed: i32,
    pub watchdog_period_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: Bounds::new(0, 255),
            default_speed: 100,
            watchdog_period_ms: 250,
        }
    }
}

impl MotionConfig {
    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }
}

/// Obstacle stop thresholds (centimeters)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub front_center_stop_cm: u16,
    pub front_side_stop_cm: u16,
    pub rear_stop_cm: u16,
    /// Run the background autostop watchdog
    pub autostop_enabled: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            front_center_stop_cm: 25,
            front_side_stop_cm: 20,
            rear_stop_cm: 20,
            autostop_enabled: true,
        }
    }
}

/// Static-friction compensation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KickstartConfig {
    pub enabled: bool,
    /// Requested speeds below this get a breakaway pulse first
    pub threshold: i32,
    pub breakaway_speed: i32,
    pub duration_ms: u64,
}

impl Default for KickstartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 80,
            breakaway_speed: 150,
            duration_ms: 300,
        }
    }
}

impl KickstartConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Heading-hold PID and pulse shaping
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadingConfig {
    /// Heading hold active at startup
    pub enabled: bool,
    pub period_ms: u64,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub deadzone_deg: f32,
    pub integral_limit: f32,
    pub correction_speed: i32,
    /// Pulse length per unit of PID output
    pub ms_per_unit: f32,
    pub min_pulse_ms: u64,
    pub max_pulse_ms: u64,
    pub min_pulse_gap_ms: u64,
    /// Orientation samples older than this are ignored
    pub stale_after_ms: u64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ms: 100,
            kp: 2.0,
            ki: 0.05,
            kd: 0.5,
            deadzone_deg: 3.0,
            integral_limit: 50.0,
            correction_speed: 120,
            ms_per_unit: 5.0,
            min_pulse_ms: 40,
            max_pulse_ms: 250,
            min_pulse_gap_ms: 400,
            stale_after_ms: 2000,
        }
    }
}

impl HeadingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn min_pulse_gap(&self) -> Duration {
        Duration::from_millis(self.min_pulse_gap_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

/// Uphill speed boost
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UphillConfig {
    pub enabled: bool,
    pub pitch_threshold_deg: f32,
    pub dwell_ms: u64,
    pub multiplier: f32,
    pub hysteresis_deg: f32,
    pub max_speed: i32,
}

impl Default for UphillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pitch_threshold_deg: 8.0,
            dwell_ms: 1000,
            multiplier: 1.4,
            hysteresis_deg: 3.0,
            max_speed: 255,
        }
    }
}

impl UphillConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// Orientation sensor (separate handle from the arbitrated bus)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImuConfig {
    pub i2c_bus: u8,
    pub address: u16,
    pub sample_period_ms: u64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 3,
            address: 0x28,
            sample_period_ms: 20,
        }
    }
}

impl ImuConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }
}

/// TCP command receiver
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:5555".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make clamping or scheduling meaningless
    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, b: &Bounds| -> Result<()> {
            if b.min > b.max {
                return Err(Error::Config(format!(
                    "{}: min {} greater than max {}",
                    name, b.min, b.max
                )));
            }
            Ok(())
        };

        check("motion.speed", &self.motion.speed)?;
        check("uno.pan", &self.uno.pan)?;
        check("uno.tilt", &self.uno.tilt)?;
        for (name, limits) in SERVO_NAMES.iter().zip(self.mega.servo_limits.iter()) {
            check(&format!("mega.servo_limits.{}", name), limits)?;
        }

        if self.motion.speed.min < 0 || self.motion.speed.max > u16::MAX as i32 {
            return Err(Error::Config("motion.speed must fit in u16".to_string()));
        }
        if self.bus.loop_hz == 0 {
            return Err(Error::Config("bus.loop_hz must be positive".to_string()));
        }
        if self.bus.queue_capacity == 0 {
            return Err(Error::Config(
                "bus.queue_capacity must be positive".to_string(),
            ));
        }
        if self.uno.read_period_ms == 0 || self.mega.read_period_ms == 0 {
            return Err(Error::Config("read periods must be positive".to_string()));
        }
        if self.heading.min_pulse_ms > self.heading.max_pulse_ms {
            return Err(Error::Config(
                "heading.min_pulse_ms greater than max_pulse_ms".to_string(),
            ));
        }
        Ok(())
    }
}
