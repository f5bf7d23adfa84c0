//! Clock abstraction
//!
//! Wall-clock time stamps events and anchors trailing training windows; a
//! monotonic millisecond counter measures run budgets. Tests swap in a
//! [`ManualClock`] to drive both deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Source of time for the engine
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds on a monotonic counter
    fn monotonic_ms(&self) -> u64;
}

/// System clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose monotonic counter starts now
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock for testing
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    monotonic: AtomicU64,
}

impl ManualClock {
    /// Clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            monotonic: AtomicU64::new(0),
        }
    }

    /// Move wall-clock and monotonic time forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
        self.monotonic
            .fetch_add(by.num_milliseconds().max(0) as u64, Ordering::SeqCst);
    }

    /// Jump the wall clock; the monotonic counter is unaffected
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monotonic_ms(&self) -> u64 {
        self.monotonic.load(Ordering::SeqCst)
    }
}
