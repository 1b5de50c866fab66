//! Wall-clock sources for the client registry.
//!
//! Session timestamps are wall-clock times because they are reported back to
//! clients (`expires_at`, `received_at`). The registry reads them through
//! [`Clock`] so tests can drive expiry and idle windows deterministically.

use std::time::SystemTime;

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;
