//! Heading-hold thread
//!
//! Runs the decision core at a fixed rate and executes its corrections as
//! pulses: turn at the correction speed, sleep, then resume the straight
//! command. The movement controller guards both writes with the motion epoch,
//! so a stop or new command during a pulse wins. The uphill boost runs in the
//! same loop from the same orientation sample.

use super::controller::{HeadingController, HeadingDecision};
use super::uphill::{BoostAction, UphillBoost};
use crate::cache::now_us;
use crate::config::Config;
use crate::controllers::{MoveDirection, MovementController};
use crate::error::{Error, Result};
use crate::imu::SharedOrientation;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    #[default]
    Disabled,
    Tracking,
}

/// Heading-hold summary for status reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeadingStatus {
    pub enabled: bool,
    pub state: HoldState,
    pub yaw_ref: Option<f32>,
    pub error: Option<f32>,
    pub pulses: u64,
    pub uphill_boost: bool,
}

pub struct HeadingHoldService {
    enabled: Arc<AtomicBool>,
    status: Arc<Mutex<HeadingStatus>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl HeadingHoldService {
    pub fn start(
        movement: Arc<MovementController>,
        orientation: SharedOrientation,
        config: &Config,
    ) -> Result<Self> {
        let enabled = Arc::new(AtomicBool::new(config.heading.enabled));
        let status = Arc::new(Mutex::new(HeadingStatus {
            enabled: config.heading.enabled,
            ..Default::default()
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut hold = HoldLoop {
            movement,
            orientation,
            controller: HeadingController::new(&config.heading),
            uphill: UphillBoost::new(&config.uphill),
            enabled: Arc::clone(&enabled),
            status: Arc::clone(&status),
            shutdown: Arc::clone(&shutdown),
            period: config.heading.period(),
            stale_after: config.heading.stale_after(),
            correction_speed: config.heading.correction_speed,
        };

        let worker = thread::Builder::new()
            .name("heading-hold".to_string())
            .spawn(move || hold.run())
            .map_err(|e| Error::Other(format!("Failed to spawn heading thread: {}", e)))?;

        Ok(Self {
            enabled,
            status,
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            log::info!(
                "Heading hold {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.status.lock().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> HeadingStatus {
        *self.status.lock()
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            self.shutdown.store(true, Ordering::Relaxed);
            worker.join().map_err(|_| Error::ThreadPanic)?;
            log::debug!("Heading hold stopped");
        }
        Ok(())
    }
}

impl Drop for HeadingHoldService {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

struct HoldLoop {
    movement: Arc<MovementController>,
    orientation: SharedOrientation,
    controller: HeadingController,
    uphill: UphillBoost,
    enabled: Arc<AtomicBool>,
    status: Arc<Mutex<HeadingStatus>>,
    shutdown: Arc<AtomicBool>,
    period: Duration,
    stale_after: Duration,
    correction_speed: i32,
}

impl HoldLoop {
    fn run(&mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let start = Instant::now();
            self.step(start);
            if let Some(rest) = self.period.checked_sub(start.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    fn step(&mut self, now: Instant) {
        let motion = self.movement.status();
        let sample = *self.orientation.lock();
        let fresh = sample.is_fresh(now_us(), self.stale_after);
        let orientation = fresh.then_some(&sample);

        if fresh {
            match self
                .uphill
                .update(sample.pitch, motion.direction, motion.current_speed, now)
            {
                Some(BoostAction::Boost(speed)) => {
                    log::info!("Uphill ({:.1}°), boosting to {}", sample.pitch, speed);
                    self.movement.cruise(speed);
                }
                Some(BoostAction::Restore(speed)) => {
                    log::info!("Level again, restoring speed {}", speed);
                    self.movement.cruise(speed);
                }
                None => {}
            }
        }

        let decision = if self.enabled.load(Ordering::SeqCst) {
            self.controller.tick(orientation, motion.direction, now)
        } else {
            self.controller.reset();
            HeadingDecision::Idle
        };

        let mut pulsed = false;
        if let HeadingDecision::Correct(correction) = decision {
            log::debug!(
                "Heading error {:.1}°, {:?} for {:?}",
                correction.error,
                correction.turn,
                correction.duration
            );
            pulsed = self.pulse(correction.turn, correction.duration);
        }

        let mut status = self.status.lock();
        status.enabled = self.enabled.load(Ordering::SeqCst);
        status.yaw_ref = self.controller.yaw_ref();
        status.error = self.controller.last_error();
        status.state = if status.enabled && status.yaw_ref.is_some() {
            HoldState::Tracking
        } else {
            HoldState::Disabled
        };
        status.uphill_boost = self.uphill.is_active();
        if pulsed {
            status.pulses += 1;
        }
    }

    fn pulse(&self, turn: MoveDirection, duration: Duration) -> bool {
        let Some(pulse) = self.movement.pulse_turn(turn, self.correction_speed) else {
            return false;
        };
        thread::sleep(duration);
        self.movement.resume_straight(pulse);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::fixtures::{fast_config, Rig};
    use crate::imu::Orientation;

    fn orientation(yaw: f32) -> SharedOrientation {
        Arc::new(Mutex::new(Orientation {
            yaw,
            ok: true,
            timestamp_us: now_us(),
            ..Default::default()
        }))
    }

    fn set_yaw(shared: &SharedOrientation, yaw: f32) {
        let mut o = shared.lock();
        o.yaw = yaw;
        o.ok = true;
        o.timestamp_us = now_us();
    }

    fn wait_for<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn hold_config() -> Config {
        let mut config = fast_config();
        config.heading.enabled = true;
        config.heading.period_ms = 20;
        config.heading.min_pulse_gap_ms = 100;
        config.uphill.enabled = false;
        config
    }

    #[test]
    fn test_drift_triggers_left_pulse_and_resume() {
        let config = hold_config();
        let rig = Rig::new(config.clone());
        rig.set_clear(100);
        let shared = orientation(0.0);
        let service =
            HeadingHoldService::start(Arc::clone(&rig.movement), shared.clone(), &config)
                .unwrap();

        assert!(rig.movement.move_forward(Some(120)));
        assert!(wait_for(
            || service.state().state == HoldState::Tracking,
            Duration::from_secs(1)
        ));

        set_yaw(&shared, 15.0);
        assert!(wait_for(|| service.state().pulses >= 1, Duration::from_secs(1)));
        assert!(wait_for(
            || rig.drive_frames().len() >= 3,
            Duration::from_secs(1)
        ));

        let frames = rig.drive_frames();
        assert_eq!(&frames[..3], &[(120, 1), (120, 3), (120, 1)]);
    }

    #[test]
    fn test_disabled_never_pulses() {
        let mut config = hold_config();
        config.heading.enabled = false;
        let rig = Rig::new(config.clone());
        rig.set_clear(100);
        let shared = orientation(0.0);
        let service =
            HeadingHoldService::start(Arc::clone(&rig.movement), shared.clone(), &config)
                .unwrap();

        assert!(rig.movement.move_forward(Some(120)));
        set_yaw(&shared, 30.0);
        thread::sleep(Duration::from_millis(200));

        assert_eq!(service.state().state, HoldState::Disabled);
        assert_eq!(service.state().pulses, 0);
        assert_eq!(rig.drive_frames(), vec![(120, 1)]);
    }

    #[test]
    fn test_blocked_side_skips_correction() {
        let config = hold_config();
        let rig = Rig::new(config.clone());
        rig.set_clear(100);
        let shared = orientation(0.0);
        let service =
            HeadingHoldService::start(Arc::clone(&rig.movement), shared.clone(), &config)
                .unwrap();

        assert!(rig.movement.move_forward(Some(120)));
        assert!(wait_for(
            || service.state().state == HoldState::Tracking,
            Duration::from_secs(1)
        ));

        // Too close on the left to pivot that way
        rig.with_cache(|c| c.mega.left_front = Some(19));
        set_yaw(&shared, 15.0);
        thread::sleep(Duration::from_millis(300));

        assert_eq!(service.state().pulses, 0);
        assert!(!rig.drive_frames().contains(&(120, 3)));
    }

    #[test]
    fn test_stale_orientation_skips() {
        let config = hold_config();
        let rig = Rig::new(config.clone());
        rig.set_clear(100);
        let shared = orientation(0.0);
        shared.lock().ok = false;
        let service =
            HeadingHoldService::start(Arc::clone(&rig.movement), shared.clone(), &config)
                .unwrap();

        assert!(rig.movement.move_forward(Some(120)));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(service.state().yaw_ref, None);
        assert_eq!(service.state().pulses, 0);
    }

    #[test]
    fn test_toggle() {
        let config = hold_config();
        let rig = Rig::new(config.clone());
        let service =
            HeadingHoldService::start(Arc::clone(&rig.movement), orientation(0.0), &config)
                .unwrap();

        assert!(service.is_enabled());
        service.set_enabled(false);
        assert!(!service.is_enabled());
        assert!(!service.state().enabled);
    }
}
