//! Scriptable orientation source

use super::OrientationSensor;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockImuInner {
    roll: f32,
    pitch: f32,
    yaw: f32,
    failing: bool,
}

/// Clones share the same simulated sensor
#[derive(Debug, Clone, Default)]
pub struct MockImu {
    inner: Arc<Mutex<MockImuInner>>,
}

impl MockImu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_angles(&self, roll: f32, pitch: f32, yaw: f32) {
        let mut inner = self.inner.lock();
        inner.roll = roll;
        inner.pitch = pitch;
        inner.yaw = yaw;
    }

    pub fn set_yaw(&self, yaw: f32) {
        self.inner.lock().yaw = yaw;
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.inner.lock().pitch = pitch;
    }

    /// Rotate by `delta` degrees, wrapping into [0, 360)
    pub fn rotate(&self, delta: f32) {
        let mut inner = self.inner.lock();
        inner.yaw = (inner.yaw + delta).rem_euclid(360.0);
    }

    pub fn yaw(&self) -> f32 {
        self.inner.lock().yaw
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl OrientationSensor for MockImu {
    fn read_euler(&mut self) -> Result<(f32, f32, f32)> {
        let inner = self.inner.lock();
        if inner.failing {
            return Err(Error::Other("mock IMU read failure".to_string()));
        }
        Ok((inner.roll, inner.pitch, inner.yaw))
    }
}
