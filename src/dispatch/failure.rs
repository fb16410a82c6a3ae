//! Single-assignment failure cell

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Holds the first failure recorded by any worker
///
/// Later failures are dropped. The flag doubles as the "stop starting new
/// work" signal checked by workers before they begin.
#[derive(Debug)]
pub struct FailureSlot<E> {
    failed: AtomicBool,
    failure: Mutex<Option<E>>,
}

impl<E> FailureSlot<E> {
    pub fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    /// Record `failure` unless one is already held; returns whether it was kept
    pub fn record(&self, failure: E) -> bool {
        let mut slot = self.failure.lock();
        if self.is_failed() {
            return false;
        }
        *slot = Some(failure);
        self.failed.store(true, Ordering::Release);
        true
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Remove the recorded failure; the slot stays failed and refuses new ones
    pub fn take(&self) -> Option<E> {
        self.failure.lock().take()
    }
}

impl<E> Default for FailureSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}
