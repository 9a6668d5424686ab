//! Mock I2C bus for tests and hardware-free runs
//!
//! Every transaction is recorded with its start/end time. An in-flight counter
//! flags any moment where two transactions overlapped, which must never happen
//! behind the arbiter.

use super::I2cBus;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What a recorded transaction did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKind {
    Write { data: Vec<u8> },
    Read { register: u8, len: usize },
}

/// One recorded bus transaction
#[derive(Debug, Clone)]
pub struct Transaction {
    pub address: u16,
    pub kind: TransactionKind,
    pub started: Instant,
    pub finished: Instant,
    pub ok: bool,
}

/// Mock bus handle (clones share the same simulated bus)
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
    in_flight: Arc<AtomicUsize>,
    overlapped: Arc<AtomicBool>,
}

#[derive(Default)]
struct MockBusInner {
    registers: HashMap<(u16, u8), Vec<u8>>,
    transactions: Vec<Transaction>,
    fail_writes: usize,
    failing_reads: HashMap<u16, bool>,
    latency: Duration,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the block returned for `register` on `address`
    pub fn set_block(&self, address: u16, register: u8, data: &[u8]) {
        self.inner
            .lock()
            .registers
            .insert((address, register), data.to_vec());
    }

    /// Simulated duration of every transaction
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    /// Fail the next `count` writes
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.lock().fail_writes = count;
    }

    /// Make reads from `address` fail until cleared
    pub fn set_read_failure(&self, address: u16, failing: bool) {
        self.inner.lock().failing_reads.insert(address, failing);
    }

    /// All recorded transactions in execution order
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().transactions.clone()
    }

    /// Payloads of successful writes to `address`
    pub fn writes_to(&self, address: u16) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .transactions
            .iter()
            .filter(|t| t.address == address && t.ok)
            .filter_map(|t| match &t.kind {
                TransactionKind::Write { data } => Some(data.clone()),
                TransactionKind::Read { .. } => None,
            })
            .collect()
    }

    /// Number of reads attempted against `address`
    pub fn read_count(&self, address: u16) -> usize {
        self.inner
            .lock()
            .transactions
            .iter()
            .filter(|t| t.address == address && matches!(t.kind, TransactionKind::Read { .. }))
            .count()
    }

    /// Drop the transaction log
    pub fn clear_transactions(&self) {
        self.inner.lock().transactions.clear();
    }

    /// True if two transactions were ever in flight at once
    pub fn overlap_detected(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn enter(&self) -> (Instant, Duration) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        (Instant::now(), self.inner.lock().latency)
    }

    fn exit(&self, transaction: Transaction) {
        self.inner.lock().transactions.push(transaction);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl I2cBus for MockBus {
    fn write_block(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let (started, latency) = self.enter();
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let ok = {
            let mut inner = self.inner.lock();
            if inner.fail_writes > 0 {
                inner.fail_writes -= 1;
                false
            } else {
                true
            }
        };

        self.exit(Transaction {
            address,
            kind: TransactionKind::Write {
                data: data.to_vec(),
            },
            started,
            finished: Instant::now(),
            ok,
        });

        if ok {
            Ok(())
        } else {
            Err(Error::Bus {
                address,
                reason: "injected write failure".to_string(),
            })
        }
    }

    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<()> {
        let (started, latency) = self.enter();
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let result = {
            let inner = self.inner.lock();
            if inner.failing_reads.get(&address).copied().unwrap_or(false) {
                Err("injected read failure")
            } else {
                match inner.registers.get(&(address, register)) {
                    Some(data) if data.len() >= buf.len() => {
                        buf.copy_from_slice(&data[..buf.len()]);
                        Ok(())
                    }
                    Some(_) => Err("short register block"),
                    None => Err("no device"),
                }
            }
        };

        self.exit(Transaction {
            address,
            kind: TransactionKind::Read {
                register,
                len: buf.len(),
            },
            started,
            finished: Instant::now(),
            ok: result.is_ok(),
        });

        result.map_err(|reason| Error::Bus {
            address,
            reason: reason.to_string(),
        })
    }
}
