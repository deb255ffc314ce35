//! Per-thread epochs.
//!
//! A registered thread publishes a monotonically nondecreasing epoch while it
//! may hold references into shared structures, and the idle sentinel
//! otherwise. The garbage collector only reclaims an object once every
//! registered thread has moved past the epoch at which the object was
//! retired.

use std::sync::atomic::{AtomicU64, Ordering};

/// Epoch published while a thread is idle; never blocks reclamation.
pub const EPOCH_IDLE: u64 = u64::MAX;

/// A single thread's published epoch.
#[derive(Debug)]
pub struct EpochSlot {
    value: AtomicU64,
}

impl Default for EpochSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochSlot {
    /// A fresh slot in the idle state.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(EPOCH_IDLE),
        }
    }

    /// Publishes `now` as the thread's epoch.
    pub fn enter(&self, now: u64) {
        self.value.store(now, Ordering::SeqCst);
    }

    /// Publishes the idle sentinel.
    pub fn exit(&self) {
        self.value.store(EPOCH_IDLE, Ordering::SeqCst);
    }

    /// The currently published epoch.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Whether the thread is inside an epoch.
    pub fn is_pinned(&self) -> bool {
        self.current() != EPOCH_IDLE
    }
}
