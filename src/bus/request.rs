//! Write requests and cancellation guards

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Queue lane for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Regular commands, FIFO among themselves
    Normal,
    /// Stop frames; always executed before any pending normal write
    Safety,
}

/// Monotonic counter that invalidates delayed writes
///
/// Anything that changes what the robot should be doing advances the epoch.
/// A write carrying an [`EpochGuard`] taken before the change is discarded by
/// the arbiter instead of being placed on the wire.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Invalidate all outstanding guards, returning the new epoch
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Guard bound to the current epoch
    pub fn guard(&self) -> EpochGuard {
        EpochGuard {
            epoch: Arc::clone(&self.0),
            expected: self.current(),
        }
    }
}

/// Snapshot of an [`Epoch`] checked right before execution
#[derive(Debug, Clone)]
pub struct EpochGuard {
    epoch: Arc<AtomicU64>,
    expected: u64,
}

impl EpochGuard {
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.expected
    }
}

/// A single block write to one device
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub address: u16,
    pub payload: Vec<u8>,
    pub priority: Priority,
    pub guard: Option<EpochGuard>,
}

impl WriteRequest {
    pub fn new(address: u16, payload: &[u8]) -> Self {
        Self {
            address,
            payload: payload.to_vec(),
            priority: Priority::Normal,
            guard: None,
        }
    }

    /// Route through the safety lane
    pub fn safety(mut self) -> Self {
        self.priority = Priority::Safety;
        self
    }

    /// Drop the write if `guard`'s epoch has moved on by execution time
    pub fn guarded(mut self, guard: EpochGuard) -> Self {
        self.guard = Some(guard);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_invalidated_by_advance() {
        let epoch = Epoch::new();
        let guard = epoch.guard();
        assert!(guard.is_current());

        epoch.advance();
        assert!(!guard.is_current());
        assert!(epoch.guard().is_current());
    }

    #[test]
    fn test_request_builders() {
        let req = WriteRequest::new(0x08, &[1, 2]).safety();
        assert_eq!(req.priority, Priority::Safety);
        assert!(req.guard.is_none());
        assert_eq!(req.payload, vec![1, 2]);
    }
}
