//! Uphill speed boost
//!
//! Sustained nose-up pitch while driving forward temporarily multiplies the
//! speed. The original speed comes back once pitch drops below the threshold
//! minus the hysteresis band. Stopping or any new speed command drops the boost
//! without a restore write.

use crate::config::UphillConfig;
use crate::controllers::MoveDirection;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostAction {
    Boost(i32),
    Restore(i32),
}

#[derive(Debug)]
pub struct UphillBoost {
    config: UphillConfig,
    climbing_since: Option<Instant>,
    /// `(original, boosted)` while a boost is active
    active: Option<(i32, i32)>,
}

impl UphillBoost {
    pub fn new(config: &UphillConfig) -> Self {
        Self {
            config: config.clone(),
            climbing_since: None,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// `speed` is the current commanded speed (the boosted one while active)
    pub fn update(
        &mut self,
        pitch: f32,
        direction: MoveDirection,
        speed: i32,
        now: Instant,
    ) -> Option<BoostAction> {
        if !self.config.enabled || direction != MoveDirection::Forward {
            self.climbing_since = None;
            self.active = None;
            return None;
        }

        if let Some((original, boosted)) = self.active {
            if speed != boosted {
                // A new speed command replaced the boost
                self.active = None;
                self.climbing_since = None;
                return None;
            }
            if pitch < self.config.pitch_threshold_deg - self.config.hysteresis_deg {
                self.active = None;
                self.climbing_since = None;
                return Some(BoostAction::Restore(original));
            }
            return None;
        }

        if pitch < self.config.pitch_threshold_deg {
            self.climbing_since = None;
            return None;
        }

        let since = *self.climbing_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.config.dwell() {
            return None;
        }

        let boosted = ((speed as f32 * self.config.multiplier).round() as i32)
            .min(self.config.max_speed);
        if boosted <= speed {
            return None;
        }
        self.active = Some((speed, boosted));
        Some(BoostAction::Boost(boosted))
    }
}
