//! Sensor cache and validation
//!
//! The arbiter writes decoded blocks in here; everyone else only ever gets a
//! copy via [`snapshot`]. Distances are validated before anything downstream
//! sees them: a raw 0 or anything above the configured maximum is garbage from
//! a disconnected or confused sensor and becomes `None` (the ERROR state).
//! The wire/JSON form of `None` is the 999 sentinel.
//!
//! Angles use range membership instead of clamping. A pan of 300 is a bad read,
//! not a servo pinned at its end stop.

use crate::config::{MegaConfig, UnoConfig};
use crate::protocol::constants::SENSOR_ERROR;
use crate::protocol::{Bounds, MegaRaw, UnoRaw};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Cache shared between the arbiter (writer) and readers
pub type SharedCache = Arc<Mutex<SensorCache>>;

/// Microseconds since the Unix epoch
pub fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Validate a raw distance: 0 or above `max_valid` is an invalid reading
#[inline]
pub fn sanitize(raw: u16, max_valid: u16) -> Option<u16> {
    if raw == 0 || raw > max_valid {
        None
    } else {
        Some(raw)
    }
}

/// Validate a raw angle by range membership
#[inline]
pub fn sanitize_angle(raw: u16, bounds: &Bounds) -> Option<i32> {
    let value = raw as i32;
    bounds.contains(value).then_some(value)
}

/// Wire representation of a validated distance
#[inline]
pub fn to_wire(distance: Option<u16>) -> u16 {
    distance.unwrap_or(SENSOR_ERROR)
}

fn serialize_distance<S: Serializer>(distance: &Option<u16>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(to_wire(*distance))
}

/// Latest validated UNO readings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnoSnapshot {
    #[serde(serialize_with = "serialize_distance")]
    pub center_front: Option<u16>,
    #[serde(serialize_with = "serialize_distance")]
    pub right_rear: Option<u16>,
    pub pan: Option<i32>,
    pub tilt: Option<i32>,
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    /// Time of the last successful read (0 = never)
    pub timestamp_us: u64,
    pub consecutive_failures: u32,
}

impl UnoSnapshot {
    pub fn apply(&mut self, raw: &UnoRaw, config: &UnoConfig, timestamp_us: u64) {
        let max = config.max_valid_distance;
        self.center_front = sanitize(raw.center_front, max);
        self.right_rear = sanitize(raw.right_rear, max);
        self.pan = sanitize_angle(raw.pan, &config.pan);
        self.tilt = sanitize_angle(raw.tilt, &config.tilt);

        let temperature = raw.temperature_x10 as f32 / 10.0;
        self.temperature_c = (-40.0..=85.0).contains(&temperature).then_some(temperature);
        let humidity = raw.humidity_x10 as f32 / 10.0;
        self.humidity_pct = (0.0..=100.0).contains(&humidity).then_some(humidity);

        self.timestamp_us = timestamp_us;
        self.consecutive_failures = 0;
    }
}

/// Latest validated MEGA readings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MegaSnapshot {
    #[serde(serialize_with = "serialize_distance")]
    pub left_front: Option<u16>,
    #[serde(serialize_with = "serialize_distance")]
    pub right_front: Option<u16>,
    #[serde(serialize_with = "serialize_distance")]
    pub left_rear: Option<u16>,
    pub timestamp_us: u64,
    pub consecutive_failures: u32,
}

impl MegaSnapshot {
    pub fn apply(&mut self, raw: &MegaRaw, config: &MegaConfig, timestamp_us: u64) {
        let max = config.max_valid_distance;
        self.left_front = sanitize(raw.left_front, max);
        self.right_front = sanitize(raw.right_front, max);
        self.left_rear = sanitize(raw.left_rear, max);
        self.timestamp_us = timestamp_us;
        self.consecutive_failures = 0;
    }
}

/// Both peripherals' cached readings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorCache {
    pub uno: UnoSnapshot,
    pub mega: MegaSnapshot,
}

impl SensorCache {
    pub fn new_shared() -> SharedCache {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Age of the older of the two peripheral readings, `None` until both have been read
    pub fn oldest_age_us(&self, now_us: u64) -> Option<u64> {
        if self.uno.timestamp_us == 0 || self.mega.timestamp_us == 0 {
            return None;
        }
        let oldest = self.uno.timestamp_us.min(self.mega.timestamp_us);
        Some(now_us.saturating_sub(oldest))
    }
}
