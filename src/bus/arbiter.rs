//! Bus arbiter worker and caller handle
//!
//! # Loop
//!
//! Each iteration performs at most one bus transaction:
//!
//! 1. Pop a write: safety lane first, then the normal lane (FIFO within a lane).
//!    A write whose [`EpochGuard`](super::EpochGuard) is stale is discarded.
//! 2. Otherwise perform whichever periodic read is due (peripheral A first).
//! 3. Sleep out the rest of the loop period (50 Hz cap by default).
//!
//! After every write the worker holds the bus for the configured cooldown, and
//! before touching a different address than the previous transaction it waits
//! out the inter-device delay.
//!
//! # Failure handling
//!
//! Failed writes are reported to the caller and never retried. Failed reads keep
//! the previous cache contents, bump the peripheral's consecutive-failure
//! counter, and are logged on the first failure and every Nth thereafter.

use super::request::{Priority, WriteRequest};
use crate::cache::{now_us, SensorCache, SharedCache};
use crate::config::{BusConfig, Config, MegaConfig, UnoConfig};
use crate::error::{Error, Result};
use crate::protocol::constants::{MEGA_READ_LEN, UNO_READ_LEN};
use crate::protocol::{MegaRaw, UnoRaw};
use crate::transport::I2cBus;
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A queued write plus the channel its outcome is reported on
struct Job {
    request: WriteRequest,
    reply: Sender<bool>,
}

#[derive(Default)]
struct Counters {
    writes_ok: AtomicU64,
    writes_failed: AtomicU64,
    writes_dropped: AtomicU64,
    write_timeouts: AtomicU64,
    queue_full: AtomicU64,
    reads_ok: AtomicU64,
    reads_failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Arbiter counters, exposed in the robot status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub writes_ok: u64,
    pub writes_failed: u64,
    /// Guarded writes discarded because their epoch had moved on
    pub writes_dropped: u64,
    /// Callers that gave up waiting (the write may still have executed)
    pub write_timeouts: u64,
    /// Submissions that found their lane full and had to wait
    pub queue_full: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
}

/// Cheap cloneable entry point for submitting writes and reading the cache
#[derive(Clone)]
pub struct BusHandle {
    safety_tx: Sender<Job>,
    normal_tx: Sender<Job>,
    cache: SharedCache,
    counters: Arc<Counters>,
    default_timeout: Duration,
}

impl BusHandle {
    /// Queue a normal-priority write and wait up to `timeout` for its outcome
    pub fn submit_write(&self, address: u16, frame: &[u8], timeout: Duration) -> bool {
        self.submit_write_with(WriteRequest::new(address, frame), timeout)
    }

    /// Queue a write with explicit priority and guard
    ///
    /// Returns `true` only if the write executed successfully before `timeout`.
    /// A timeout does not retract the request; it may still execute later.
    pub fn submit_write_with(&self, request: WriteRequest, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let address = request.address;
        let lane = match request.priority {
            Priority::Safety => &self.safety_tx,
            Priority::Normal => &self.normal_tx,
        };

        let (reply_tx, reply_rx) = bounded(1);
        let job = Job {
            request,
            reply: reply_tx,
        };

        match lane.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                Counters::bump(&self.counters.queue_full);
                log::warn!("Write queue full, waiting for space ({:#04x})", address);
                let remaining = deadline.saturating_duration_since(Instant::now());
                match lane.send_timeout(job, remaining) {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(_)) => {
                        Counters::bump(&self.counters.write_timeouts);
                        log::warn!("Write to {:#04x} not queued before timeout", address);
                        return false;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        log::error!("Bus arbiter not running, write to {:#04x} lost", address);
                        return false;
                    }
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Bus arbiter not running, write to {:#04x} lost", address);
                return false;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match reply_rx.recv_timeout(remaining) {
            Ok(ok) => ok,
            Err(RecvTimeoutError::Timeout) => {
                Counters::bump(&self.counters.write_timeouts);
                log::warn!("Write to {:#04x} timed out after {:?}", address, timeout);
                false
            }
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Latest sensor snapshot; never touches the bus
    pub fn read_cache(&self) -> SensorCache {
        self.cache.lock().clone()
    }

    /// Shared cache backing [`read_cache`](Self::read_cache)
    pub fn cache(&self) -> SharedCache {
        Arc::clone(&self.cache)
    }

    pub fn stats(&self) -> BusStats {
        let c = &self.counters;
        BusStats {
            writes_ok: c.writes_ok.load(Ordering::Relaxed),
            writes_failed: c.writes_failed.load(Ordering::Relaxed),
            writes_dropped: c.writes_dropped.load(Ordering::Relaxed),
            write_timeouts: c.write_timeouts.load(Ordering::Relaxed),
            queue_full: c.queue_full.load(Ordering::Relaxed),
            reads_ok: c.reads_ok.load(Ordering::Relaxed),
            reads_failed: c.reads_failed.load(Ordering::Relaxed),
        }
    }

    /// Configured default wait for a write outcome
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

/// Owner of the arbiter worker thread
pub struct BusArbiter {
    handle: BusHandle,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BusArbiter {
    /// Move `bus` into a new worker thread and start arbitrating
    pub fn start(bus: Box<dyn I2cBus>, config: &Config, cache: SharedCache) -> Result<Self> {
        let capacity = config.bus.queue_capacity.max(1);
        let (safety_tx, safety_rx) = bounded(capacity);
        let (normal_tx, normal_rx) = bounded(capacity);
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let now = Instant::now();
        let worker = Worker {
            bus,
            safety_rx,
            normal_rx,
            cache: Arc::clone(&cache),
            counters: Arc::clone(&counters),
            shutdown: Arc::clone(&shutdown),
            timing: config.bus.clone(),
            uno: config.uno.clone(),
            mega: config.mega.clone(),
            last_address: None,
            last_transaction_end: None,
            next_uno_read: now,
            // Stagger so both reads are not due in the same iteration at startup
            next_mega_read: now + config.bus.inter_device_delay(),
        };

        let handle = thread::Builder::new()
            .name("i2c-arbiter".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("Failed to spawn arbiter thread: {}", e)))?;

        log::info!(
            "Bus arbiter started (bus {}, {} Hz, cooldown {} ms)",
            config.bus.i2c_bus,
            config.bus.loop_hz,
            config.bus.write_cooldown_ms
        );

        Ok(Self {
            handle: BusHandle {
                safety_tx,
                normal_tx,
                cache,
                counters,
                default_timeout: config.bus.write_timeout(),
            },
            shutdown,
            worker: Some(handle),
        })
    }

    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            log::info!("Shutting down bus arbiter...");
            self.shutdown.store(true, Ordering::Relaxed);
            worker.join().map_err(|_| Error::ThreadPanic)?;
            log::info!("Bus arbiter stopped");
        }
        Ok(())
    }
}

impl Drop for BusArbiter {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

struct Worker {
    bus: Box<dyn I2cBus>,
    safety_rx: Receiver<Job>,
    normal_rx: Receiver<Job>,
    cache: SharedCache,
    counters: Arc<Counters>,
    shutdown: Arc<AtomicBool>,
    timing: BusConfig,
    uno: UnoConfig,
    mega: MegaConfig,
    last_address: Option<u16>,
    last_transaction_end: Option<Instant>,
    next_uno_read: Instant,
    next_mega_read: Instant,
}

impl Worker {
    fn run(mut self) {
        let period = self.timing.loop_period();

        while !self.shutdown.load(Ordering::Relaxed) {
            let tick_start = Instant::now();

            match self.next_job() {
                Some(job) => self.execute_write(job),
                None => self.poll_due_read(tick_start),
            }

            if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
                thread::sleep(rest);
            }
        }

        // Anything still queued is answered rather than left to time out
        for job in self.safety_rx.try_iter().chain(self.normal_rx.try_iter()) {
            let _ = job.reply.send(false);
        }
        log::debug!("Arbiter loop exited");
    }

    fn next_job(&self) -> Option<Job> {
        self.safety_rx
            .try_recv()
            .ok()
            .or_else(|| self.normal_rx.try_recv().ok())
    }

    fn execute_write(&mut self, job: Job) {
        let Job { request, reply } = job;

        if let Some(guard) = &request.guard {
            if !guard.is_current() {
                Counters::bump(&self.counters.writes_dropped);
                log::debug!(
                    "Dropping superseded write to {:#04x}: {:02X?}",
                    request.address,
                    request.payload
                );
                let _ = reply.send(false);
                return;
            }
        }

        self.settle_for(request.address);
        let result = self.bus.write_block(request.address, &request.payload);
        self.mark(request.address);

        let ok = match result {
            Ok(()) => {
                Counters::bump(&self.counters.writes_ok);
                log::trace!("Wrote {:02X?} to {:#04x}", request.payload, request.address);
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.writes_failed);
                log::warn!("Write to {:#04x} failed: {}", request.address, e);
                false
            }
        };
        let _ = reply.send(ok);

        thread::sleep(self.timing.write_cooldown());
    }

    fn poll_due_read(&mut self, now: Instant) {
        if now >= self.next_uno_read {
            self.next_uno_read = now + self.uno.read_period();
            self.read_uno();
        } else if now >= self.next_mega_read {
            self.next_mega_read = now + self.mega.read_period();
            self.read_mega();
        }
    }

    fn read_uno(&mut self) {
        let address = self.uno.address;
        let mut buf = [0u8; UNO_READ_LEN];

        self.settle_for(address);
        let result = self
            .bus
            .read_block(address, self.uno.read_register, &mut buf)
            .and_then(|_| UnoRaw::parse(&buf));
        self.mark(address);

        match result {
            Ok(raw) => {
                Counters::bump(&self.counters.reads_ok);
                self.cache.lock().uno.apply(&raw, &self.uno, now_us());
            }
            Err(e) => {
                Counters::bump(&self.counters.reads_failed);
                let failures = {
                    let mut cache = self.cache.lock();
                    cache.uno.consecutive_failures += 1;
                    cache.uno.consecutive_failures
                };
                self.log_read_failure("UNO", address, failures, &e);
            }
        }
    }

    fn read_mega(&mut self) {
        let address = self.mega.address;
        let mut buf = [0u8; MEGA_READ_LEN];

        self.settle_for(address);
        let result = self
            .bus
            .read_block(address, self.mega.read_register, &mut buf)
            .and_then(|_| MegaRaw::parse(&buf));
        self.mark(address);

        match result {
            Ok(raw) => {
                Counters::bump(&self.counters.reads_ok);
                self.cache.lock().mega.apply(&raw, &self.mega, now_us());
            }
            Err(e) => {
                Counters::bump(&self.counters.reads_failed);
                let failures = {
                    let mut cache = self.cache.lock();
                    cache.mega.consecutive_failures += 1;
                    cache.mega.consecutive_failures
                };
                self.log_read_failure("MEGA", address, failures, &e);
            }
        }
    }

    fn log_read_failure(&self, name: &str, address: u16, failures: u32, error: &Error) {
        let every = self.timing.read_failure_log_every.max(1);
        if failures == 1 || failures % every == 0 {
            log::warn!(
                "{} read at {:#04x} failed ({} consecutive): {}",
                name,
                address,
                failures,
                error
            );
        }
    }

    /// Wait out the inter-device gap when switching targets
    fn settle_for(&self, address: u16) {
        if let (Some(last), Some(end)) = (self.last_address, self.last_transaction_end) {
            if last != address {
                let gap = self.timing.inter_device_delay();
                if let Some(rest) = gap.checked_sub(end.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }
    }

    fn mark(&mut self, address: u16) {
        self.last_address = Some(address);
        self.last_transaction_end = Some(Instant::now());
    }
}
