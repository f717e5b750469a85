//! Best-effort deadlock detection.
//!
//! Nothing here ever cancels or retries work. Lock acquisitions that wait
//! longer than the configured timeout, and critical sections that run longer
//! than it, are logged at error level so a stuck context shows up in logs.

use log::error;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::time::{Duration, Instant};

/// Default timeout after which lock waits and long holds are reported.
pub const DEFAULT_DEADLOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Logs on drop if the guarded section outlived its timeout.
///
/// The label is only formatted when a report is actually logged.
#[derive(Debug)]
pub struct DeadlockTimer<L: fmt::Display> {
    label: L,
    started: Instant,
    timeout: Duration,
}

impl<L: fmt::Display> DeadlockTimer<L> {
    /// Starts timing a critical section.
    pub fn start(label: L, timeout: Duration) -> Self {
        Self {
            label,
            started: Instant::now(),
            timeout,
        }
    }

    /// Time spent in the section so far.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns true once the section has run past its timeout.
    pub fn expired(&self) -> bool {
        !self.timeout.is_zero() && self.elapsed() > self.timeout
    }
}

impl<L: fmt::Display> Drop for DeadlockTimer<L> {
    fn drop(&mut self) {
        if self.expired() {
            error!(
                "possible deadlock: {} held for {:?} (timeout {:?})",
                self.label,
                self.elapsed(),
                self.timeout
            );
        }
    }
}

/// Takes a read lock, reporting if the wait exceeds `timeout`.
pub fn read_or_report<'a, T>(
    lock: &'a RwLock<T>,
    label: &str,
    timeout: Duration,
) -> RwLockReadGuard<'a, T> {
    if timeout.is_zero() {
        return lock.read();
    }
    match lock.try_read_for(timeout) {
        Some(guard) => guard,
        None => {
            error!(
                "possible deadlock: waited {:?} for read lock on {}",
                timeout, label
            );
            lock.read()
        }
    }
}

/// Takes a write lock, reporting if the wait exceeds `timeout`.
pub fn write_or_report<'a, T>(
    lock: &'a RwLock<T>,
    label: &str,
    timeout: Duration,
) -> RwLockWriteGuard<'a, T> {
    if timeout.is_zero() {
        return lock.write();
    }
    match lock.try_write_for(timeout) {
        Some(guard) => guard,
        None => {
            error!(
                "possible deadlock: waited {:?} for write lock on {}",
                timeout, label
            );
            lock.write()
        }
    }
}
