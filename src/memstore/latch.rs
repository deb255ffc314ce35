//! The per-segment latch.
//!
//! The whole latch state lives in a single 64-bit word:
//!
//! ```text
//! [ writer:1 | rebalancer:1 | wait:1 | invalid:1 | readers:20 | version:40 ]
//! ```
//!
//! Readers share the latch; a writer or a rebalancer is exclusive with
//! everything else. Optimistic readers never touch the word beyond two atomic
//! loads: one to capture the version, one to validate it. The version is
//! bumped on every exclusive release and on invalidation, so a successful
//! validation proves the traversed content was not concurrently mutated.
//!
//! Blocking acquisitions park on a wait room (mutex + condvar). The wait
//! room's mutex serialises the park/wake transitions that the original
//! design guarded with a dedicated exclusive bit.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::error::{MemError, MemResult};

const MASK_WRITER: u64 = 1 << 63;
const MASK_REBALANCER: u64 = 1 << 62;
const MASK_WAIT: u64 = 1 << 61;
const MASK_INVALID: u64 = 1 << 60;

const READERS_SHIFT: u32 = 40;
const READER_ONE: u64 = 1 << READERS_SHIFT;
/// Reader counter cap. Acquisitions past this fail with `TooManyReaders`
/// rather than silently wrapping into the flag bits.
pub const MAX_READERS: u64 = (1 << 20) - 1;
const MASK_READERS: u64 = MAX_READERS << READERS_SHIFT;

const MASK_VERSION: u64 = (1 << READERS_SHIFT) - 1;

const MASK_EXCLUSIVE: u64 = MASK_WRITER | MASK_REBALANCER;

/// Decoded view of the latch word, for diagnostics and assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatchState {
    /// A writer holds the latch.
    pub writer: bool,
    /// A rebalancer holds the latch.
    pub rebalancer: bool,
    /// At least one thread is parked on the wait room.
    pub wait: bool,
    /// The segment was superseded; the latch is terminal.
    pub invalid: bool,
    /// Number of shared readers.
    pub readers: u64,
    /// Current version.
    pub version: u64,
}

impl LatchState {
    fn decode(word: u64) -> Self {
        Self {
            writer: word & MASK_WRITER != 0,
            rebalancer: word & MASK_REBALANCER != 0,
            wait: word & MASK_WAIT != 0,
            invalid: word & MASK_INVALID != 0,
            readers: (word & MASK_READERS) >> READERS_SHIFT,
            version: word & MASK_VERSION,
        }
    }
}

impl std::fmt::Display for LatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.writer {
            write!(f, "writer, ")?;
        }
        if self.rebalancer {
            write!(f, "rebalancer, ")?;
        }
        if self.wait {
            write!(f, "wait, ")?;
        }
        if self.invalid {
            write!(f, "invalid, ")?;
        }
        if self.readers != 0 {
            write!(f, "readers({}), ", self.readers)?;
        }
        write!(f, "version: {}", self.version)
    }
}

/// The segment latch.
pub struct SegmentLatch {
    state: AtomicU64,
    room: Mutex<u32>,
    condvar: Condvar,
}

impl Default for SegmentLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentLatch {
    /// A free latch at version zero.
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
            room: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    fn load(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    /// Decoded state, for diagnostics.
    pub fn snapshot(&self) -> LatchState {
        LatchState::decode(self.load())
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.load() & MASK_VERSION
    }

    /// Whether the latch reached its terminal state.
    pub fn is_invalid(&self) -> bool {
        self.load() & MASK_INVALID != 0
    }

    /// Begins an optimistic read: a single atomic load.
    pub fn optimistic_begin(&self) -> MemResult<u64> {
        let word = self.load();
        if word & MASK_INVALID != 0 {
            return Err(MemError::Invalid);
        }
        if word & MASK_EXCLUSIVE != 0 {
            return Err(MemError::Abort);
        }
        Ok(word & MASK_VERSION)
    }

    /// Validates an optimistic read begun at `version`.
    pub fn optimistic_validate(&self, version: u64) -> MemResult<()> {
        let word = self.load();
        if word & MASK_INVALID != 0 {
            return Err(MemError::Invalid);
        }
        if word & MASK_EXCLUSIVE != 0 || word & MASK_VERSION != version {
            return Err(MemError::Abort);
        }
        Ok(())
    }

    /// Acquires the latch in shared (reader) mode, waiting out any exclusive
    /// holder.
    pub fn reader_enter(&self) -> MemResult<()> {
        loop {
            let word = self.load();
            if word & MASK_INVALID != 0 {
                return Err(MemError::Invalid);
            }
            if word & MASK_EXCLUSIVE != 0 {
                self.park(|w| w & (MASK_EXCLUSIVE | MASK_INVALID) != 0);
                continue;
            }
            if (word & MASK_READERS) >> READERS_SHIFT == MAX_READERS {
                return Err(MemError::TooManyReaders);
            }
            if self
                .state
                .compare_exchange_weak(
                    word,
                    word + READER_ONE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Releases a shared acquisition.
    pub fn reader_exit(&self) {
        let prev = self.state.fetch_sub(READER_ONE, Ordering::AcqRel);
        debug_assert!(prev & MASK_READERS != 0, "reader count underflow");
        let remaining = (prev - READER_ONE) & MASK_READERS;
        if prev & MASK_WAIT != 0 && remaining == 0 {
            self.wake();
        }
    }

    /// Acquires the latch in writer mode. Writers exclude readers, other
    /// writers and rebalancers.
    pub fn writer_enter(&self) -> MemResult<()> {
        self.exclusive_enter(MASK_WRITER)
    }

    /// Releases the writer, bumping the version.
    pub fn writer_exit(&self) {
        self.exclusive_exit(MASK_WRITER);
    }

    /// Acquires the latch in rebalancer mode.
    pub fn rebalancer_enter(&self) -> MemResult<()> {
        self.exclusive_enter(MASK_REBALANCER)
    }

    /// Attempts to acquire the rebalancer mode without blocking. `Ok(false)`
    /// means the latch is currently contended.
    pub fn rebalancer_try_enter(&self) -> MemResult<bool> {
        loop {
            let word = self.load();
            if word & MASK_INVALID != 0 {
                return Err(MemError::Invalid);
            }
            if word & MASK_EXCLUSIVE != 0 || word & MASK_READERS != 0 {
                return Ok(false);
            }
            if self
                .state
                .compare_exchange_weak(
                    word,
                    word | MASK_REBALANCER,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(true);
            }
        }
    }

    /// Releases the rebalancer, bumping the version.
    pub fn rebalancer_exit(&self) {
        self.exclusive_exit(MASK_REBALANCER);
    }

    /// Marks the latch invalid. The caller must hold the latch in writer or
    /// rebalancer mode; parked threads are woken so they can observe the
    /// terminal state and restart from the index.
    pub fn mark_invalid(&self) {
        let prev = self.state.fetch_or(MASK_INVALID, Ordering::AcqRel);
        debug_assert!(
            prev & MASK_EXCLUSIVE != 0,
            "invalidation requires an exclusive holder"
        );
        self.wake();
    }

    fn exclusive_enter(&self, mode: u64) -> MemResult<()> {
        loop {
            let word = self.load();
            if word & MASK_INVALID != 0 {
                return Err(MemError::Invalid);
            }
            if word & MASK_EXCLUSIVE != 0 || word & MASK_READERS != 0 {
                self.park(|w| {
                    w & MASK_INVALID != 0 || w & (MASK_EXCLUSIVE | MASK_READERS) != 0
                });
                continue;
            }
            if self
                .state
                .compare_exchange_weak(word, word | mode, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    fn exclusive_exit(&self, mode: u64) {
        let result = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            debug_assert!(word & mode != 0, "exclusive release without hold");
            let version = (word & MASK_VERSION).wrapping_add(1) & MASK_VERSION;
            Some((word & !(mode | MASK_VERSION)) | version)
        });
        if let Ok(prev) = result {
            if prev & MASK_WAIT != 0 {
                self.wake();
            }
        }
    }

    /// Parks the calling thread while `blocked(word)` holds, with the
    /// standard re-check under the wait-room mutex to avoid a lost wake-up.
    /// Invalidation also satisfies `blocked == false` observers because it
    /// wakes everyone.
    fn park(&self, blocked: impl Fn(u64) -> bool) {
        let mut waiters = self.room.lock();
        let word = self.load();
        if !blocked(word) || word & MASK_INVALID != 0 {
            return;
        }
        self.state.fetch_or(MASK_WAIT, Ordering::AcqRel);
        // Re-check after publishing the wait bit: a release racing between
        // the first check and the publication has not seen the bit and will
        // not wake anyone. A stale wait bit is cleared by the next release.
        let word = self.load();
        if !blocked(word) || word & MASK_INVALID != 0 {
            return;
        }
        *waiters += 1;
        self.condvar.wait(&mut waiters);
        *waiters -= 1;
        if *waiters == 0 {
            self.state.fetch_and(!MASK_WAIT, Ordering::AcqRel);
        }
    }

    fn wake(&self) {
        let waiters = self.room.lock();
        if *waiters > 0 {
            self.condvar.notify_all();
        } else {
            self.state.fetch_and(!MASK_WAIT, Ordering::AcqRel);
        }
    }
}

impl std::fmt::Debug for SegmentLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SegmentLatch({})", self.snapshot())
    }
}
