//! # Deterministic Clock
//!
//! Spans are timestamped in block-relative virtual time:
//!
//! ```text
//! now(t) = block_time + (t - start_time)
//! ```
//!
//! Replays of the same block therefore produce the same span start times
//! regardless of when they run, and durations still reflect real elapsed time.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of wall-clock readings.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualWallClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualWallClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl WallClock for ManualWallClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Maps wall-clock readings to virtual block time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTimeClock {
    start_time: DateTime<Utc>,
    block_time: DateTime<Utc>,
}

impl BlockTimeClock {
    pub fn new(current_system_time: DateTime<Utc>, block_time: DateTime<Utc>) -> Self {
        Self {
            start_time: current_system_time,
            block_time,
        }
    }

    /// Virtual time for the given wall-clock reading.
    pub fn now(&self, current_system_time: DateTime<Utc>) -> DateTime<Utc> {
        let passed = current_system_time.signed_duration_since(self.start_time);
        self.block_time + passed
    }

    pub fn block_time(&self) -> DateTime<Utc> {
        self.block_time
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }
}

/// A [`BlockTimeClock`] bound to the wall clock it reads from.
#[derive(Clone)]
pub struct VirtualClock {
    clock: BlockTimeClock,
    wall: Arc<dyn WallClock>,
}

impl VirtualClock {
    pub fn new(clock: BlockTimeClock, wall: Arc<dyn WallClock>) -> Self {
        Self { clock, wall }
    }

    /// Current virtual time.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now(self.wall.now())
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualClock")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
