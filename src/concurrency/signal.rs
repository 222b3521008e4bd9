//! Level signal: a count-down synchronisation point

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// An integer level that threads lower and wait on.
///
/// A wait for level `n` returns once the level is at or below `n`. Used as a
/// fan-in barrier (initialised to the number of participants, each of which
/// decrements once) and to turn completion callbacks into blocking calls.
#[derive(Debug)]
pub struct Signal {
    level: Mutex<u32>,
    cond: Condvar,
}

impl Signal {
    pub fn new(initial_level: u32) -> Self {
        Signal {
            level: Mutex::new(initial_level),
            cond: Condvar::new(),
        }
    }

    /// Set the level and wake every waiter
    pub fn signal_level(&self, level: u32) {
        let mut current = self.level.lock();
        *current = level;
        self.cond.notify_all();
    }

    /// Lower the level by one (saturating) and wake every waiter
    pub fn signal_decrement(&self) {
        let mut current = self.level.lock();
        *current = current.saturating_sub(1);
        self.cond.notify_all();
    }

    /// Raise the level by one
    pub fn signal_increment(&self) {
        *self.level.lock() += 1;
    }

    /// Block until the level is at or below `level`
    pub fn wait_for_level(&self, level: u32) {
        let mut current = self.level.lock();
        while *current > level {
            self.cond.wait(&mut current);
        }
    }

    /// Like [`wait_for_level`](Self::wait_for_level) but gives up after
    /// `timeout`. Returns whether the level was reached.
    pub fn wait_for_level_timeout(&self, level: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut current = self.level.lock();
        while *current > level {
            if self.cond.wait_until(&mut current, deadline).timed_out() {
                return *current <= level;
            }
        }
        true
    }

    pub fn level(&self) -> u32 {
        *self.level.lock()
    }

    pub fn is_reached(&self, level: u32) -> bool {
        *self.level.lock() <= level
    }
}
