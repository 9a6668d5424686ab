//! Bus arbitration
//!
//! One worker thread owns the physical bus handle and serializes every
//! transaction: queued writes from any number of callers and the two periodic
//! sensor reads. Callers talk to it through a cloneable [`BusHandle`].
//!
//! ```text
//!  callers ──submit_write──▶ ┌────────────┐  safety lane (drained first)
//!                            │  arbiter   │  normal lane (FIFO)
//!  readers ◀──read_cache──── │  worker    │──▶ I2cBus (exclusive)
//!                            └────────────┘
//!                                  │ periodic reads
//!                                  ▼
//!                             SensorCache
//! ```

mod arbiter;
mod request;

pub use arbiter::{BusArbiter, BusHandle, BusStats};
pub use request::{Epoch, EpochGuard, Priority, WriteRequest};
