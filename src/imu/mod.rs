//! Orientation sampling
//!
//! The orientation sensor sits on its own bus handle, separate from the
//! arbitrated bus, and is sampled by a dedicated thread. Consumers only see the
//! latest published [`Orientation`].

#[cfg(feature = "hardware")]
mod bno055;
mod mock;

#[cfg(feature = "hardware")]
pub use bno055::Bno055;
pub use mock::MockImu;

use crate::cache::now_us;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Latest fused orientation in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Orientation {
    pub roll: f32,
    pub pitch: f32,
    /// Heading, increasing clockwise
    pub yaw: f32,
    /// False when the most recent read failed
    pub ok: bool,
    /// Time of the last successful read
    pub timestamp_us: u64,
}

impl Orientation {
    /// Valid and no older than `max_age`
    pub fn is_fresh(&self, now_us: u64, max_age: Duration) -> bool {
        self.ok && now_us.saturating_sub(self.timestamp_us) <= max_age.as_micros() as u64
    }
}

pub type SharedOrientation = Arc<Mutex<Orientation>>;

/// Euler-angle source
pub trait OrientationSensor: Send {
    /// `(roll, pitch, yaw)` in degrees
    fn read_euler(&mut self) -> Result<(f32, f32, f32)>;
}

/// Owner of the sampling thread
pub struct ImuSampler {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ImuSampler {
    pub fn start(
        sensor: Box<dyn OrientationSensor>,
        period: Duration,
        shared: SharedOrientation,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let worker = thread::Builder::new()
            .name("imu-sampler".to_string())
            .spawn(move || sample_loop(sensor, period, shared, flag))
            .map_err(|e| Error::Other(format!("Failed to spawn IMU thread: {}", e)))?;

        Ok(Self {
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            self.shutdown.store(true, Ordering::Relaxed);
            worker.join().map_err(|_| Error::ThreadPanic)?;
            log::debug!("IMU sampler stopped");
        }
        Ok(())
    }
}

impl Drop for ImuSampler {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn sample_loop(
    mut sensor: Box<dyn OrientationSensor>,
    period: Duration,
    shared: SharedOrientation,
    shutdown: Arc<AtomicBool>,
) {
    let mut failures: u32 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        let start = Instant::now();

        match sensor.read_euler() {
            Ok((roll, pitch, yaw)) => {
                if failures > 0 {
                    log::info!("IMU recovered after {} failed reads", failures);
                    failures = 0;
                }
                *shared.lock() = Orientation {
                    roll,
                    pitch,
                    yaw,
                    ok: true,
                    timestamp_us: now_us(),
                };
            }
            Err(e) => {
                failures += 1;
                if failures == 1 || failures % 50 == 0 {
                    log::warn!("IMU read failed ({} consecutive): {}", failures, e);
                }
                shared.lock().ok = false;
            }
        }

        if let Some(rest) = period.checked_sub(start.elapsed()) {
            thread::sleep(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_freshness() {
        let o = Orientation {
            ok: true,
            timestamp_us: 1_000_000,
            ..Default::default()
        };
        assert!(o.is_fresh(2_500_000, Duration::from_secs(2)));
        assert!(!o.is_fresh(3_500_000, Duration::from_secs(2)));

        let failed = Orientation { ok: false, ..o };
        assert!(!failed.is_fresh(1_000_000, Duration::from_secs(2)));
    }

    #[test]
    fn test_sampler_publishes_and_flags_failures() {
        let imu = MockImu::new();
        imu.set_angles(1.0, -2.0, 45.0);
        let shared: SharedOrientation = Arc::new(Mutex::new(Orientation::default()));
        let _sampler =
            ImuSampler::start(Box::new(imu.clone()), Duration::from_millis(5), shared.clone())
                .unwrap();

        assert!(wait_for(|| shared.lock().ok));
        let first = *shared.lock();
        assert_eq!((first.roll, first.pitch, first.yaw), (1.0, -2.0, 45.0));

        imu.set_failing(true);
        assert!(wait_for(|| !shared.lock().ok));
        let failed = *shared.lock();
        assert_eq!(failed.yaw, 45.0);

        imu.set_failing(false);
        assert!(wait_for(|| shared.lock().ok));
    }
}
