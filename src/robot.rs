//! RathIO - robot facade
//!
//! Wires the arbiter, controllers and background services together and exposes
//! the command surface used by the command receiver and any embedding
//! application. Every command returns `bool`; failures are logged, never
//! raised, so callers always get a well-formed answer.

use crate::bus::{BusArbiter, BusHandle, BusStats};
use crate::cache::{now_us, to_wire, SensorCache};
use crate::config::Config;
use crate::controllers::{
    safety, ArmController, CameraController, KickstartManager, MoveDirection, MovementController,
    ObstacleFlags, RgbController, SharedState, Watchdog,
};
use crate::error::Result;
use crate::heading::{HeadingHoldService, HeadingStatus};
use crate::imu::{ImuSampler, Orientation, OrientationSensor, SharedOrientation};
use crate::protocol::constants::SERVO_COUNT;
use crate::transport::I2cBus;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Distances in centimeters; 999 marks an invalid reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distances {
    pub center_front: u16,
    pub left_front: u16,
    pub right_front: u16,
    pub left_rear: u16,
    pub right_rear: u16,
}

impl Distances {
    fn from_cache(cache: &SensorCache) -> Self {
        Self {
            center_front: to_wire(cache.uno.center_front),
            left_front: to_wire(cache.mega.left_front),
            right_front: to_wire(cache.mega.right_front),
            left_rear: to_wire(cache.mega.left_rear),
            right_rear: to_wire(cache.uno.right_rear),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Environment {
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    /// Last commanded angles
    pub pan: i32,
    pub tilt: i32,
    /// Angles reported by the UNO, `None` when out of range or not yet read
    pub pan_reading: Option<i32>,
    pub tilt_reading: Option<i32>,
}

/// Per-board read health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorHealth {
    pub uno_timestamp_us: u64,
    pub mega_timestamp_us: u64,
    pub uno_failures: u32,
    pub mega_failures: u32,
    /// Age of the older board reading, `None` until both have been read
    pub oldest_age_us: Option<u64>,
}

/// Snapshot returned by [`Robot::get_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotStatus {
    pub distances: Distances,
    pub obstacles: ObstacleFlags,
    /// Speed used by moves without an explicit speed
    pub speed: i32,
    /// Speed currently on the wire
    pub current_speed: i32,
    pub direction: MoveDirection,
    pub is_moving: bool,
    pub kickstart_pending: bool,
    pub timestamp_us: u64,
    pub sensors: SensorHealth,
    pub environment: Environment,
    pub camera: CameraStatus,
    pub arm: [i32; SERVO_COUNT],
    pub rgb: [u8; 3],
    pub orientation: Orientation,
    pub heading_hold: HeadingStatus,
    pub bus: BusStats,
}

/// Background threads, torn down together
struct Workers {
    heading: HeadingHoldService,
    watchdog: Option<Watchdog>,
    imu: Option<ImuSampler>,
    kickstart: KickstartManager,
    arbiter: BusArbiter,
}

pub struct Robot {
    config: Config,
    bus: BusHandle,
    state: Arc<SharedState>,
    movement: Arc<MovementController>,
    camera: CameraController,
    arm: ArmController,
    rgb: RgbController,
    orientation: SharedOrientation,
    workers: Mutex<Option<Workers>>,
}

impl Robot {
    /// Start every service on top of `bus`
    ///
    /// Without an orientation sensor heading hold and uphill boost stay idle.
    pub fn new(
        config: Config,
        bus: Box<dyn I2cBus>,
        imu_sensor: Option<Box<dyn OrientationSensor>>,
    ) -> Result<Self> {
        config.validate()?;
        log::info!(
            "RathIO: starting (UNO {:#04x}, MEGA {:#04x})",
            config.uno.address,
            config.mega.address
        );

        let arbiter = BusArbiter::start(bus, &config, SensorCache::new_shared())?;
        let handle = arbiter.handle();
        let state = SharedState::new(&config);

        let kickstart =
            KickstartManager::start(handle.clone(), Arc::clone(&state), config.uno.address)?;
        let movement = Arc::new(MovementController::new(
            handle.clone(),
            Arc::clone(&state),
            kickstart.handle(),
            &config,
        ));

        let watchdog = if config.safety.autostop_enabled {
            Some(Watchdog::start(
                handle.clone(),
                Arc::clone(&movement),
                config.safety.clone(),
                config.motion.watchdog_period(),
            )?)
        } else {
            log::warn!("RathIO: autostop watchdog disabled by configuration");
            None
        };

        let orientation: SharedOrientation = Arc::new(Mutex::new(Orientation::default()));
        let imu = match imu_sensor {
            Some(sensor) => Some(ImuSampler::start(
                sensor,
                config.imu.sample_period(),
                Arc::clone(&orientation),
            )?),
            None => {
                log::warn!("RathIO: no orientation sensor, heading hold inactive");
                None
            }
        };

        let heading =
            HeadingHoldService::start(Arc::clone(&movement), Arc::clone(&orientation), &config)?;

        let camera = CameraController::new(handle.clone(), Arc::clone(&state), &config);
        let arm = ArmController::new(handle.clone(), &config);
        let rgb = RgbController::new(handle.clone(), &config);

        log::info!("RathIO: ready");
        Ok(Self {
            config,
            bus: handle,
            state,
            movement,
            camera,
            arm,
            rgb,
            orientation,
            workers: Mutex::new(Some(Workers {
                heading,
                watchdog,
                imu,
                kickstart,
                arbiter,
            })),
        })
    }

    // === Motion ===

    pub fn move_forward(&self, speed: Option<i32>) -> bool {
        self.movement.move_forward(speed)
    }

    pub fn move_backward(&self, speed: Option<i32>) -> bool {
        self.movement.move_backward(speed)
    }

    pub fn tank_turn_left(&self, speed: Option<i32>) -> bool {
        self.movement.tank_turn_left(speed)
    }

    pub fn tank_turn_right(&self, speed: Option<i32>) -> bool {
        self.movement.tank_turn_right(speed)
    }

    pub fn stop(&self) -> bool {
        self.movement.stop()
    }

    pub fn update_speed(&self, speed: i32) -> bool {
        self.movement.update_speed(speed)
    }

    // === Heading hold ===

    pub fn enable_heading_hold(&self, enabled: bool) {
        if let Some(workers) = self.workers.lock().as_ref() {
            workers.heading.set_enabled(enabled);
        }
    }

    pub fn heading_hold_enabled(&self) -> bool {
        self.workers
            .lock()
            .as_ref()
            .map(|w| w.heading.is_enabled())
            .unwrap_or(false)
    }

    // === Peripherals ===

    pub fn set_pan_tilt(&self, pan: i32, tilt: i32) -> bool {
        self.camera.set_pan_tilt(pan, tilt)
    }

    pub fn center_camera(&self) -> bool {
        self.camera.center()
    }

    pub fn set_servo_angle(&self, id: usize, angle: i32) -> bool {
        self.arm.set_servo_angle(id, angle)
    }

    pub fn set_servo_angles(&self, angles: [i32; SERVO_COUNT]) -> bool {
        self.arm.set_servo_angles(angles)
    }

    pub fn home_arm(&self) -> bool {
        self.arm.home()
    }

    pub fn set_rgb_color(&self, r: i32, g: i32, b: i32) -> bool {
        self.rgb.set_rgb_color(r, g, b)
    }

    pub fn rgb_off(&self) -> bool {
        self.rgb.off()
    }

    // === Status ===

    pub fn get_status(&self) -> RobotStatus {
        let cache = self.bus.read_cache();
        let motion = self.state.snapshot();
        let timestamp_us = now_us();
        let heading_hold = self
            .workers
            .lock()
            .as_ref()
            .map(|w| w.heading.state())
            .unwrap_or_default();

        RobotStatus {
            distances: Distances::from_cache(&cache),
            obstacles: safety::obstacle_flags(&cache, &self.config.safety),
            speed: motion.target_speed,
            current_speed: motion.current_speed,
            direction: motion.direction,
            is_moving: motion.is_moving,
            kickstart_pending: motion.kickstart.is_some(),
            timestamp_us,
            sensors: SensorHealth {
                uno_timestamp_us: cache.uno.timestamp_us,
                mega_timestamp_us: cache.mega.timestamp_us,
                uno_failures: cache.uno.consecutive_failures,
                mega_failures: cache.mega.consecutive_failures,
                oldest_age_us: cache.oldest_age_us(timestamp_us),
            },
            environment: Environment {
                temperature_c: cache.uno.temperature_c,
                humidity_pct: cache.uno.humidity_pct,
            },
            camera: CameraStatus {
                pan: motion.pan,
                tilt: motion.tilt,
                pan_reading: cache.uno.pan,
                tilt_reading: cache.uno.tilt,
            },
            arm: self.arm.angles(),
            rgb: self.rgb.color(),
            orientation: *self.orientation.lock(),
            heading_hold,
            bus: self.bus.stats(),
        }
    }

    /// Latest cached sensor values
    pub fn sensors(&self) -> SensorCache {
        self.bus.read_cache()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Lifecycle ===

    /// Stop the robot and join every background thread
    ///
    /// Heading hold and the watchdog go first so nothing re-issues motion after
    /// the final stop. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        let Some(mut workers) = self.workers.lock().take() else {
            return Ok(());
        };
        log::info!("RathIO: shutting down...");

        workers.heading.shutdown()?;
        if let Some(watchdog) = workers.watchdog.as_mut() {
            watchdog.shutdown()?;
        }
        self.movement.stop();
        if let Some(imu) = workers.imu.as_mut() {
            imu.shutdown()?;
        }
        workers.kickstart.shutdown()?;
        workers.arbiter.shutdown()?;

        log::info!("RathIO: shutdown complete");
        Ok(())
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
