//! Kickstart: breakaway pulse before a slow start
//!
//! Starting from rest (or reversing) at a low speed may not overcome static
//! friction. The movement controller sends a short burst at the breakaway speed
//! and arms a restore here. A dedicated thread owns the single pending slot:
//! arming replaces whatever was pending, and the restore only goes out if the
//! generation recorded in [`MotionState`] still matches when the deadline hits.
//!
//! The restore write carries an epoch guard taken under the state lock, so a
//! `stop()` issued after the timer fired still wins.

use super::state::{KickstartState, MotionState, MoveDirection, SharedState};
use crate::bus::{BusHandle, WriteRequest};
use crate::config::KickstartConfig;
use crate::error::{Error, Result};
use crate::protocol::constants::DRIVE_FRAME_LEN;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How a motion command should be launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Send the requested speed straight away
    Direct,
    /// Send the breakaway speed now, restore `generation` later
    Breakaway { generation: u64 },
    /// A breakaway in this direction is already running; only the restore target changes
    Retarget { generation: u64 },
}

/// Decide the launch for `direction`/`speed` and record it in `state`
///
/// Must be called with the state lock held, before `state.direction` is updated.
pub fn plan(
    config: &KickstartConfig,
    state: &mut MotionState,
    direction: MoveDirection,
    speed: i32,
) -> Launch {
    if !config.enabled
        || direction == MoveDirection::Stop
        || speed <= 0
        || speed >= config.threshold
    {
        state.kickstart = None;
        return Launch::Direct;
    }

    let retarget = matches!(state.kickstart, Some(k) if k.direction == direction);
    if !retarget && state.direction == direction {
        // Already rolling this way
        state.kickstart = None;
        return Launch::Direct;
    }

    let generation = state.next_kickstart_generation();
    state.kickstart = Some(KickstartState {
        generation,
        direction,
        target_speed: speed,
    });

    if retarget {
        Launch::Retarget { generation }
    } else {
        Launch::Breakaway { generation }
    }
}

struct Pending {
    generation: u64,
    restore: [u8; DRIVE_FRAME_LEN],
    due: Instant,
}

enum Message {
    Arm(Pending),
    Cancel,
    Shutdown,
}

/// Sender side used by the movement controller
#[derive(Clone)]
pub struct KickstartHandle {
    tx: Sender<Message>,
}

impl KickstartHandle {
    /// Schedule `restore` after `delay`, replacing any pending restore
    pub fn arm(&self, generation: u64, restore: [u8; DRIVE_FRAME_LEN], delay: Duration) {
        let pending = Pending {
            generation,
            restore,
            due: Instant::now() + delay,
        };
        if self.tx.send(Message::Arm(pending)).is_err() {
            log::warn!("Kickstart thread not running, restore not scheduled");
        }
    }

    /// Drop the pending restore, if any
    pub fn cancel(&self) {
        let _ = self.tx.send(Message::Cancel);
    }
}

/// Owner of the kickstart timer thread
pub struct KickstartManager {
    handle: KickstartHandle,
    worker: Option<JoinHandle<()>>,
}

impl KickstartManager {
    pub fn start(bus: BusHandle, state: Arc<SharedState>, address: u16) -> Result<Self> {
        let (tx, rx) = unbounded();
        let timer = Timer {
            rx,
            bus,
            state,
            address,
        };

        let worker = thread::Builder::new()
            .name("kickstart".to_string())
            .spawn(move || timer.run())
            .map_err(|e| Error::Other(format!("Failed to spawn kickstart thread: {}", e)))?;

        Ok(Self {
            handle: KickstartHandle { tx },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> KickstartHandle {
        self.handle.clone()
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            let _ = self.handle.tx.send(Message::Shutdown);
            worker.join().map_err(|_| Error::ThreadPanic)?;
            log::debug!("Kickstart thread stopped");
        }
        Ok(())
    }
}

impl Drop for KickstartManager {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

struct Timer {
    rx: Receiver<Message>,
    bus: BusHandle,
    state: Arc<SharedState>,
    address: u16,
}

impl Timer {
    fn run(self) {
        let mut pending: Option<Pending> = None;

        loop {
            let msg = match &pending {
                Some(p) => self
                    .rx
                    .recv_timeout(p.due.saturating_duration_since(Instant::now())),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match msg {
                Ok(Message::Arm(next)) => pending = Some(next),
                Ok(Message::Cancel) => pending = None,
                Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(due) = pending.take() {
                        self.fire(due);
                    }
                }
            }
        }
    }

    fn fire(&self, pending: Pending) {
        let guard = {
            let mut state = self.state.lock();
            match state.kickstart {
                Some(k) if k.generation == pending.generation => state.kickstart = None,
                _ => {
                    log::debug!("Kickstart {} superseded", pending.generation);
                    return;
                }
            }
            self.state.epoch().guard()
        };

        let request = WriteRequest::new(self.address, &pending.restore).guarded(guard);
        if self
            .bus
            .submit_write_with(request, self.bus.default_timeout())
        {
            log::debug!("Kickstart {} restored target speed", pending.generation);
        } else {
            log::warn!("Kickstart {} restore not applied", pending.generation);
        }
    }
}
