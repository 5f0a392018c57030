//! Time source for timeslices and pauses.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Millisecond clock used by the scheduler.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Block until `ms` milliseconds have passed.
    fn sleep_ms(&self, ms: u64);
}

/// Wall clock.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Deterministic clock: every reading advances time by a fixed step, and
/// sleeping advances it by the requested amount without blocking.
///
/// With a step of 1 ms, an instance with a 10 ms timeslice executes about
/// ten instructions per slice.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    step: u64,
}

impl ManualClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }

    /// Move time forward without a reading.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Current time, without advancing.
    pub fn peek(&self) -> u64 {
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.step);
        t
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}
