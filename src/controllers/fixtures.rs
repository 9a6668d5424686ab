//! Shared test rig: mock bus, arbiter, kickstart timer and movement controller

use super::kickstart::KickstartManager;
use super::movement::MovementController;
use super::state::SharedState;
use crate::bus::{BusArbiter, BusHandle};
use crate::cache::SensorCache;
use crate::config::Config;
use crate::protocol::constants::DRIVE_FRAME_LEN;
use crate::transport::MockBus;
use std::sync::Arc;

pub(crate) fn fast_config() -> Config {
    let mut config = Config::default();
    config.bus.write_cooldown_ms = 1;
    config.bus.inter_device_delay_ms = 1;
    config.bus.loop_hz = 500;
    config.uno.read_period_ms = 20;
    config.mega.read_period_ms = 20;
    config.kickstart.duration_ms = 60;
    config.motion.watchdog_period_ms = 20;
    config
}

/// Fields drop in order: controllers first, arbiter last
pub(crate) struct Rig {
    pub config: Config,
    pub bus: MockBus,
    pub state: Arc<SharedState>,
    pub movement: Arc<MovementController>,
    pub kickstart: KickstartManager,
    pub arbiter: BusArbiter,
}

impl Rig {
    /// Nothing is scripted on the mock, so periodic reads fail and the cache
    /// keeps whatever the test injects.
    pub fn new(config: Config) -> Self {
        let bus = MockBus::new();
        let arbiter =
            BusArbiter::start(Box::new(bus.clone()), &config, SensorCache::new_shared()).unwrap();
        let state = SharedState::new(&config);
        let kickstart =
            KickstartManager::start(arbiter.handle(), Arc::clone(&state), config.uno.address)
                .unwrap();
        let movement = Arc::new(MovementController::new(
            arbiter.handle(),
            Arc::clone(&state),
            kickstart.handle(),
            &config,
        ));

        Self {
            config,
            bus,
            state,
            movement,
            kickstart,
            arbiter,
        }
    }

    pub fn handle(&self) -> BusHandle {
        self.arbiter.handle()
    }

    pub fn with_cache<F: FnOnce(&mut SensorCache)>(&self, f: F) {
        let cache = self.handle().cache();
        let mut guard = cache.lock();
        f(&mut guard);
    }

    /// Every distance channel reads `cm`
    pub fn set_clear(&self, cm: u16) {
        self.with_cache(|c| {
            c.uno.center_front = Some(cm);
            c.uno.right_rear = Some(cm);
            c.mega.left_front = Some(cm);
            c.mega.right_front = Some(cm);
            c.mega.left_rear = Some(cm);
        });
    }

    /// `(speed, direction)` of every drive frame that reached the UNO
    pub fn drive_frames(&self) -> Vec<(u16, u16)> {
        self.bus
            .writes_to(self.config.uno.address)
            .iter()
            .filter(|f| f.len() == DRIVE_FRAME_LEN)
            .map(|f| {
                (
                    u16::from_le_bytes([f[0], f[1]]),
                    u16::from_le_bytes([f[2], f[3]]),
                )
            })
            .collect()
    }
}
