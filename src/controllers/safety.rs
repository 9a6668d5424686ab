//! Obstacle checks against the sensor cache
//!
//! A reading blocks motion only when it is valid and strictly below its stop
//! threshold. Sensors in the ERROR state never block: a single glitching
//! sensor would otherwise freeze the robot in place.

use super::state::MoveDirection;
use crate::cache::SensorCache;
use crate::config::SafetyConfig;
use serde::Serialize;
use std::fmt;

/// Distance channels on both boards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    CenterFront,
    LeftFront,
    RightFront,
    RightRear,
    LeftRear,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::CenterFront => "center-front",
            Sensor::LeftFront => "left-front",
            Sensor::RightFront => "right-front",
            Sensor::RightRear => "right-rear",
            Sensor::LeftRear => "left-rear",
        };
        f.write_str(name)
    }
}

/// The first sensor found blocking a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Obstacle {
    pub sensor: Sensor,
    pub distance: u16,
}

/// Per-side obstacle summary for status reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObstacleFlags {
    pub front: bool,
    pub rear: bool,
    pub left: bool,
    pub right: bool,
}

fn check(sensor: Sensor, reading: Option<u16>, threshold: u16) -> Option<Obstacle> {
    reading
        .filter(|d| *d < threshold)
        .map(|distance| Obstacle { sensor, distance })
}

pub fn forward_blocked(cache: &SensorCache, cfg: &SafetyConfig) -> Option<Obstacle> {
    check(Sensor::CenterFront, cache.uno.center_front, cfg.front_center_stop_cm)
        .or_else(|| check(Sensor::LeftFront, cache.mega.left_front, cfg.front_side_stop_cm))
        .or_else(|| check(Sensor::RightFront, cache.mega.right_front, cfg.front_side_stop_cm))
}

pub fn backward_blocked(cache: &SensorCache, cfg: &SafetyConfig) -> Option<Obstacle> {
    check(Sensor::RightRear, cache.uno.right_rear, cfg.rear_stop_cm)
        .or_else(|| check(Sensor::LeftRear, cache.mega.left_rear, cfg.rear_stop_cm))
}

pub fn left_blocked(cache: &SensorCache, cfg: &SafetyConfig) -> Option<Obstacle> {
    check(Sensor::LeftFront, cache.mega.left_front, cfg.front_side_stop_cm)
}

pub fn right_blocked(cache: &SensorCache, cfg: &SafetyConfig) -> Option<Obstacle> {
    check(Sensor::RightFront, cache.mega.right_front, cfg.front_side_stop_cm)
}

/// Obstacle check for any commanded direction (stop is never blocked)
pub fn blocked(
    direction: MoveDirection,
    cache: &SensorCache,
    cfg: &SafetyConfig,
) -> Option<Obstacle> {
    match direction {
        MoveDirection::Stop => None,
        MoveDirection::Forward => forward_blocked(cache, cfg),
        MoveDirection::Backward => backward_blocked(cache, cfg),
        MoveDirection::TurnLeft => left_blocked(cache, cfg),
        MoveDirection::TurnRight => right_blocked(cache, cfg),
    }
}

pub fn obstacle_flags(cache: &SensorCache, cfg: &SafetyConfig) -> ObstacleFlags {
    ObstacleFlags {
        front: forward_blocked(cache, cfg).is_some(),
        rear: backward_blocked(cache, cfg).is_some(),
        left: left_blocked(cache, cfg).is_some(),
        right: right_blocked(cache, cfg).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_cache() -> SensorCache {
        let mut cache = SensorCache::default();
        cache.uno.center_front = Some(100);
        cache.uno.right_rear = Some(100);
        cache.mega.left_front = Some(100);
        cache.mega.right_front = Some(100);
        cache.mega.left_rear = Some(100);
        cache
    }

    #[test]
    fn test_clear_path() {
        let cfg = SafetyConfig::default();
        let cache = clear_cache();
        assert_eq!(obstacle_flags(&cache, &cfg), ObstacleFlags::default());
    }

    #[test]
    fn test_front_center_blocks_forward_only() {
        let cfg = SafetyConfig::default();
        let mut cache = clear_cache();
        cache.uno.center_front = Some(10);

        let ob = forward_blocked(&cache, &cfg).unwrap();
        assert_eq!(ob.sensor, Sensor::CenterFront);
        assert_eq!(ob.distance, 10);
        assert!(backward_blocked(&cache, &cfg).is_none());
        assert!(left_blocked(&cache, &cfg).is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let cfg = SafetyConfig::default();
        let mut cache = clear_cache();
        cache.uno.center_front = Some(cfg.front_center_stop_cm);
        assert!(forward_blocked(&cache, &cfg).is_none());

        cache.uno.center_front = Some(cfg.front_center_stop_cm - 1);
        assert!(forward_blocked(&cache, &cfg).is_some());
    }

    #[test]
    fn test_error_reading_never_blocks() {
        let cfg = SafetyConfig::default();
        let mut cache = clear_cache();
        cache.uno.center_front = None;
        cache.mega.left_front = None;
        cache.uno.right_rear = None;
        assert!(forward_blocked(&cache, &cfg).is_none());
        assert!(backward_blocked(&cache, &cfg).is_none());
        assert!(left_blocked(&cache, &cfg).is_none());
    }

    #[test]
    fn test_turns_use_their_own_side() {
        let cfg = SafetyConfig::default();
        let mut cache = clear_cache();
        cache.mega.right_front = Some(5);

        assert!(blocked(MoveDirection::TurnRight, &cache, &cfg).is_some());
        assert!(blocked(MoveDirection::TurnLeft, &cache, &cfg).is_none());
        // Front side sensors also guard forward motion
        assert_eq!(
            forward_blocked(&cache, &cfg).map(|o| o.sensor),
            Some(Sensor::RightFront)
        );
    }

    #[test]
    fn test_either_rear_sensor_blocks_backward() {
        let cfg = SafetyConfig::default();
        let mut cache = clear_cache();
        cache.mega.left_rear = Some(3);
        assert_eq!(
            blocked(MoveDirection::Backward, &cache, &cfg).map(|o| o.sensor),
            Some(Sensor::LeftRear)
        );
        assert!(blocked(MoveDirection::Stop, &cache, &cfg).is_none());
    }
}
