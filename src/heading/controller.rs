//! Heading-hold decision core
//!
//! Pure state machine: given the latest orientation and the commanded
//! direction it decides whether a corrective pulse is due, which way, and for
//! how long. Executing the pulse is the service's job.

use super::pid::PidController;
use crate::config::HeadingConfig;
use crate::controllers::MoveDirection;
use crate::imu::Orientation;
use std::time::{Duration, Instant};

/// Wrap an angle into [-180, 180]
pub fn normalize_angle(deg: f32) -> f32 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && deg > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// A timed corrective tank turn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub turn: MoveDirection,
    pub duration: Duration,
    /// Heading error that triggered it, degrees
    pub error: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingDecision {
    /// Not driving straight; nothing tracked
    Idle,
    /// Tracking, no pulse this tick
    Hold,
    /// Orientation unavailable or stale
    Skip,
    Correct(Correction),
}

#[derive(Debug)]
pub struct HeadingController {
    config: HeadingConfig,
    pid: PidController,
    yaw_ref: Option<f32>,
    segment: Option<MoveDirection>,
    last_tick: Option<Instant>,
    last_pulse: Option<Instant>,
    last_error: Option<f32>,
}

impl HeadingController {
    pub fn new(config: &HeadingConfig) -> Self {
        Self {
            pid: PidController::new(config.kp, config.ki, config.kd, config.integral_limit),
            config: config.clone(),
            yaw_ref: None,
            segment: None,
            last_tick: None,
            last_pulse: None,
            last_error: None,
        }
    }

    /// Forget the reference and PID history
    pub fn reset(&mut self) {
        self.pid.reset();
        self.yaw_ref = None;
        self.segment = None;
        self.last_tick = None;
        self.last_error = None;
    }

    pub fn yaw_ref(&self) -> Option<f32> {
        self.yaw_ref
    }

    pub fn last_error(&self) -> Option<f32> {
        self.last_error
    }

    /// `orientation` is `None` when the sensor is failing or stale
    pub fn tick(
        &mut self,
        orientation: Option<&Orientation>,
        direction: MoveDirection,
        now: Instant,
    ) -> HeadingDecision {
        if !direction.is_linear() {
            self.reset();
            return HeadingDecision::Idle;
        }
        if self.segment != Some(direction) {
            self.reset();
            self.segment = Some(direction);
        }

        let Some(orientation) = orientation else {
            return HeadingDecision::Skip;
        };

        let Some(yaw_ref) = self.yaw_ref else {
            log::debug!("Heading reference captured at {:.1}°", orientation.yaw);
            self.yaw_ref = Some(orientation.yaw);
            self.last_tick = Some(now);
            self.last_error = Some(0.0);
            return HeadingDecision::Hold;
        };

        let error = normalize_angle(orientation.yaw - yaw_ref);
        self.last_error = Some(error);
        let dt = self
            .last_tick
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_else(|| self.config.period())
            .as_secs_f32();
        self.last_tick = Some(now);

        if error.abs() < self.config.deadzone_deg {
            self.pid.reset();
            return HeadingDecision::Hold;
        }

        let output = self.pid.compute(error, dt);

        if let Some(last) = self.last_pulse {
            if now.saturating_duration_since(last) < self.config.min_pulse_gap() {
                return HeadingDecision::Hold;
            }
        }

        let ms = (output.abs() * self.config.ms_per_unit).round() as u64;
        if ms == 0 {
            return HeadingDecision::Hold;
        }

        // Yaw grows clockwise: positive output steers back to the left
        let turn = if output > 0.0 {
            MoveDirection::TurnLeft
        } else {
            MoveDirection::TurnRight
        };
        let duration =
            Duration::from_millis(ms.clamp(self.config.min_pulse_ms, self.config.max_pulse_ms));

        self.last_pulse = Some(now);
        HeadingDecision::Correct(Correction {
            turn,
            duration,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use approx::assert_relative_eq;

    fn at(yaw: f32) -> Orientation {
        Orientation {
            yaw,
            ok: true,
            ..Default::default()
        }
    }

    fn controller() -> (HeadingController, HeadingConfig) {
        let config = Config::default().heading;
        (HeadingController::new(&config), config)
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(0.0), 0.0);
        assert_relative_eq!(normalize_angle(190.0), -170.0);
        assert_relative_eq!(normalize_angle(-190.0), 170.0);
        assert_relative_eq!(normalize_angle(350.0 - 10.0), -20.0);
        assert_relative_eq!(normalize_angle(5.0 - 355.0), 10.0);
        assert_relative_eq!(normalize_angle(180.0), 180.0);
        assert_relative_eq!(normalize_angle(-180.0), -180.0);
        assert_relative_eq!(normalize_angle(720.0 + 30.0), 30.0);
    }

    #[test]
    fn test_reference_captured_lazily() {
        let (mut hc, _) = controller();
        let now = Instant::now();

        assert_eq!(hc.tick(Some(&at(42.0)), MoveDirection::Stop, now), HeadingDecision::Idle);
        assert_eq!(hc.yaw_ref(), None);

        assert_eq!(hc.tick(Some(&at(42.0)), MoveDirection::Forward, now), HeadingDecision::Hold);
        assert_eq!(hc.yaw_ref(), Some(42.0));
    }

    #[test]
    fn test_skip_without_orientation() {
        let (mut hc, _) = controller();
        let now = Instant::now();
        assert_eq!(hc.tick(None, MoveDirection::Forward, now), HeadingDecision::Skip);
        assert_eq!(hc.yaw_ref(), None);
    }

    #[test]
    fn test_deadzone_holds() {
        let (mut hc, config) = controller();
        let t0 = Instant::now();
        hc.tick(Some(&at(10.0)), MoveDirection::Forward, t0);

        let t1 = t0 + config.period();
        assert_eq!(
            hc.tick(Some(&at(12.0)), MoveDirection::Forward, t1),
            HeadingDecision::Hold
        );
    }

    #[test]
    fn test_drift_direction() {
        let (mut hc, config) = controller();
        let t0 = Instant::now();
        hc.tick(Some(&at(0.0)), MoveDirection::Forward, t0);

        match hc.tick(Some(&at(10.0)), MoveDirection::Forward, t0 + config.period()) {
            HeadingDecision::Correct(c) => {
                assert_eq!(c.turn, MoveDirection::TurnLeft);
                assert!(c.duration >= Duration::from_millis(config.min_pulse_ms));
                assert!(c.duration <= Duration::from_millis(config.max_pulse_ms));
            }
            other => panic!("expected correction, got {:?}", other),
        }

        let (mut hc, _) = controller();
        hc.tick(Some(&at(0.0)), MoveDirection::Backward, t0);
        match hc.tick(Some(&at(350.0)), MoveDirection::Backward, t0 + config.period()) {
            HeadingDecision::Correct(c) => {
                assert_eq!(c.turn, MoveDirection::TurnRight);
                assert_relative_eq!(c.error, -10.0, epsilon = 1e-4);
            }
            other => panic!("expected correction, got {:?}", other),
        }
    }

    #[test]
    fn test_derivative_braking_turns_back() {
        let (mut hc, config) = controller();
        let gap = config.min_pulse_gap();
        let t0 = Instant::now();
        hc.tick(Some(&at(0.0)), MoveDirection::Forward, t0);

        match hc.tick(Some(&at(20.0)), MoveDirection::Forward, t0 + gap) {
            HeadingDecision::Correct(c) => assert_eq!(c.turn, MoveDirection::TurnLeft),
            other => panic!("expected correction, got {:?}", other),
        }

        // Error still positive, but falling fast enough that the output goes negative
        match hc.tick(Some(&at(5.0)), MoveDirection::Forward, t0 + gap * 2) {
            HeadingDecision::Correct(c) => {
                assert_eq!(c.turn, MoveDirection::TurnRight);
                assert_relative_eq!(c.error, 5.0, epsilon = 1e-4);
                assert!(c.duration >= Duration::from_millis(config.min_pulse_ms));
            }
            other => panic!("expected correction, got {:?}", other),
        }
    }

    #[test]
    fn test_negligible_output_holds() {
        let mut config = Config::default().heading;
        config.ms_per_unit = 0.01;
        let mut hc = HeadingController::new(&config);
        let t0 = Instant::now();
        hc.tick(Some(&at(0.0)), MoveDirection::Forward, t0);

        assert_eq!(
            hc.tick(Some(&at(5.0)), MoveDirection::Forward, t0 + config.period()),
            HeadingDecision::Hold
        );
    }

    #[test]
    fn test_pulse_length_capped() {
        let (mut hc, config) = controller();
        let t0 = Instant::now();
        hc.tick(Some(&at(0.0)), MoveDirection::Forward, t0);

        match hc.tick(Some(&at(170.0)), MoveDirection::Forward, t0 + config.period()) {
            HeadingDecision::Correct(c) => {
                assert_eq!(c.duration, Duration::from_millis(config.max_pulse_ms))
            }
            other => panic!("expected correction, got {:?}", other),
        }
    }

    #[test]
    fn test_direction_change_resets_reference() {
        let (mut hc, config) = controller();
        let t0 = Instant::now();
        hc.tick(Some(&at(0.0)), MoveDirection::Forward, t0);
        hc.tick(Some(&at(30.0)), MoveDirection::Backward, t0 + config.period());
        assert_eq!(hc.yaw_ref(), Some(30.0));
    }

    /// Constant +10° disturbance, then a plant that rotates 20°/s while pulsing
    #[test]
    fn test_converges_with_spaced_pulses() {
        let (mut hc, config) = controller();
        let rate_deg_per_ms = 0.02;
        let mut now = Instant::now();
        let mut yaw = 0.0f32;

        hc.tick(Some(&at(yaw)), MoveDirection::Forward, now);
        yaw = 10.0;

        let mut pulses: Vec<(Instant, f32)> = Vec::new();
        for _ in 0..200 {
            now += config.period();
            if let HeadingDecision::Correct(c) =
                hc.tick(Some(&at(yaw)), MoveDirection::Forward, now)
            {
                pulses.push((now, c.error.abs()));
                let delta = rate_deg_per_ms * c.duration.as_millis() as f32;
                match c.turn {
                    MoveDirection::TurnLeft => yaw -= delta,
                    _ => yaw += delta,
                }
            }
        }

        assert!(!pulses.is_empty());
        assert!(yaw.abs() < config.deadzone_deg, "final error {}", yaw);
        for pair in pulses.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= config.min_pulse_gap());
            assert!(pair[1].1 <= pair[0].1 + 0.5, "error grew: {:?}", pair);
        }
    }
}
