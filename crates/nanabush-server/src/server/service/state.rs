//! Call admission and in-flight accounting.
//!
//! Every RPC enters through [`ServiceState::admit`], which refuses new work
//! once shutdown has begun and hands out a [`CallGuard`] that keeps the call
//! counted until it is dropped. Streaming calls move their guard into the task
//! that drives the stream, so they stay counted until the stream ends.

use core::time::Duration;
use nanabush_core::Error;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{Instant, sleep, timeout_at};

#[derive(Debug, Default)]
pub struct ServiceState {
    shutting_down: AtomicBool,
    inflight: AtomicUsize,
}

impl ServiceState {
    /// Admits a new call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`begin_shutdown`] was called.
    ///
    /// [`begin_shutdown`]: ServiceState::begin_shutdown
    pub fn admit(self: &Arc<Self>) -> Result<CallGuard, Error> {
        // Count first so a concurrent drain never misses a call admitted
        // right before the flag was set.
        self.inflight.fetch_add(1, Ordering::AcqRel);
        if self.shutting_down.load(Ordering::Acquire) {
            self.inflight.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ServiceShutdown);
        }
        Ok(CallGuard {
            state: Arc::clone(self),
        })
    }

    /// Stops admitting calls. Calls already admitted keep running.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Number of admitted calls that have not finished yet.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Waits until no call is in flight or `deadline` passes. Returns whether
    /// everything drained.
    pub async fn drain(&self, deadline: Instant) -> bool {
        timeout_at(deadline, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Keeps one call counted as in flight until dropped.
#[derive(Debug)]
pub struct CallGuard {
    state: Arc<ServiceState>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.state.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
