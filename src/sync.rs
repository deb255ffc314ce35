//! Version-stamped optimistic locking.
//!
//! An [`OptimisticLatch`] pairs an inner lock with a version counter that is
//! bumped on every exclusive release. Readers that cannot afford to block
//! capture the version, read, and validate; a failed validation means a
//! writer intervened and the read must be retried.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// The captured version no longer matches: a writer intervened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMismatch;

/// A version-stamped lock.
pub struct OptimisticLatch<T> {
    version: AtomicU64,
    data: RwLock<T>,
}

impl<T> OptimisticLatch<T> {
    /// Wraps `data` starting at version zero.
    pub fn new(data: T) -> Self {
        Self {
            version: AtomicU64::new(0),
            data: RwLock::new(data),
        }
    }

    /// Current version. Odd transitions are not used; any change signals
    /// an intervening writer.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Runs `f` under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.data.read();
        f(&guard)
    }

    /// Runs `f` under the exclusive lock and bumps the version.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.data.write();
        let result = f(&mut guard);
        self.version.fetch_add(1, Ordering::Release);
        result
    }

    /// Runs `f` optimistically until it observes a stable version.
    ///
    /// `f` may run several times; it must be side-effect free. When the latch
    /// is write-contended the attempt degrades to a shared-lock read.
    pub fn optimistic<R>(&self, mut f: impl FnMut(&T) -> R) -> R {
        loop {
            let version = self.version();
            if let Some(guard) = self.data.try_read() {
                let result = f(&guard);
                drop(guard);
                if self.version() == version {
                    return result;
                }
            } else {
                // A writer holds the lock; fall back to waiting for it.
                let guard = self.data.read();
                return f(&guard);
            }
        }
    }

    /// Captures the current version for later validation.
    ///
    /// The guard is intentionally not `Send`: a validation on a different
    /// thread than the capture would be meaningless.
    pub fn begin(&self) -> OptimisticGuard<'_, T> {
        OptimisticGuard {
            latch: self,
            version: self.version(),
            _not_send: PhantomData,
        }
    }
}

impl<T: Default> Default for OptimisticLatch<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Scoped capture of an [`OptimisticLatch`] version.
pub struct OptimisticGuard<'a, T> {
    latch: &'a OptimisticLatch<T>,
    version: u64,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> OptimisticGuard<'a, T> {
    /// Checks that no writer intervened since the capture.
    pub fn validate(&self) -> Result<(), VersionMismatch> {
        if self.latch.version() == self.version {
            Ok(())
        } else {
            Err(VersionMismatch)
        }
    }
}
