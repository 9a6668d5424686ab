//! Autostop watchdog
//!
//! Polls the sensor cache at a fixed rate and stops the robot when an obstacle
//! appears in the direction it is driving. This is the only path that ends
//! motion without an external command. Tank turns are not watched.

use super::movement::MovementController;
use super::safety;
use crate::bus::BusHandle;
use crate::config::SafetyConfig;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Watchdog {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn start(
        bus: BusHandle,
        movement: Arc<MovementController>,
        safety: SafetyConfig,
        period: Duration,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let worker = thread::Builder::new()
            .name("autostop".to_string())
            .spawn(move || watchdog_loop(bus, movement, safety, period, flag))
            .map_err(|e| Error::Other(format!("Failed to spawn autostop thread: {}", e)))?;

        log::info!("Autostop watchdog running every {:?}", period);
        Ok(Self {
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            self.shutdown.store(true, Ordering::Relaxed);
            worker.join().map_err(|_| Error::ThreadPanic)?;
            log::debug!("Autostop watchdog stopped");
        }
        Ok(())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn watchdog_loop(
    bus: BusHandle,
    movement: Arc<MovementController>,
    safety: SafetyConfig,
    period: Duration,
    shutdown: Arc<AtomicBool>,
) {
    // Set after an autostop; cleared once the path is clear or motion restarts
    let mut tripped = false;

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(period);

        let motion = movement.status();
        if !motion.is_moving {
            tripped = false;
            continue;
        }

        let cache = bus.read_cache();
        match safety::blocked(motion.direction, &cache, &safety) {
            Some(ob) if !tripped => {
                log::warn!(
                    "Autostop: {} obstacle at {} cm while moving {:?}",
                    ob.sensor,
                    ob.distance,
                    motion.direction
                );
                movement.stop();
                tripped = true;
            }
            Some(_) => {}
            None => tripped = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::fixtures::{fast_config, Rig};
    use crate::controllers::MoveDirection;
    use std::time::Instant;

    fn wait_until_stopped(rig: &Rig, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if !rig.movement.status().is_moving {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn start(rig: &Rig) -> Watchdog {
        Watchdog::start(
            rig.handle(),
            Arc::clone(&rig.movement),
            rig.config.safety.clone(),
            rig.config.motion.watchdog_period(),
        )
        .unwrap()
    }

    #[test]
    fn test_stops_on_new_obstacle() {
        let rig = Rig::new(fast_config());
        rig.set_clear(100);
        let _watchdog = start(&rig);

        assert!(rig.movement.move_forward(Some(100)));
        rig.with_cache(|c| c.uno.center_front = Some(12));

        // One poll period plus the stop round trip
        let limit = rig.config.motion.watchdog_period() * 3;
        assert!(wait_until_stopped(&rig, limit));
        assert_eq!(rig.drive_frames(), vec![(100, 1), (0, 0)]);
    }

    #[test]
    fn test_watches_reverse_with_rear_sensors() {
        let rig = Rig::new(fast_config());
        rig.set_clear(100);
        let _watchdog = start(&rig);

        assert!(rig.movement.move_backward(Some(100)));
        rig.with_cache(|c| c.mega.left_rear = Some(4));

        assert!(wait_until_stopped(&rig, Duration::from_millis(500)));
    }

    #[test]
    fn test_ignores_turns_and_error_readings() {
        let rig = Rig::new(fast_config());
        rig.set_clear(100);
        let _watchdog = start(&rig);

        assert!(rig.movement.tank_turn_left(Some(100)));
        rig.with_cache(|c| c.mega.left_front = Some(3));
        thread::sleep(rig.config.motion.watchdog_period() * 4);
        assert_eq!(rig.movement.status().direction, MoveDirection::TurnLeft);

        rig.set_clear(100);
        assert!(rig.movement.move_forward(Some(100)));
        rig.with_cache(|c| c.uno.center_front = None);
        thread::sleep(rig.config.motion.watchdog_period() * 4);
        assert!(rig.movement.status().is_moving);
    }
}
