//! Recycling of per-transaction undo logs.
//!
//! Transactions are created and retired at a high rate; their undo-log
//! buffers are worth reusing. Each worker owns a pool; thread contexts draw
//! from the pool of the worker they were wired to at registration. The
//! periodic `TxnPoolPass` task rebuilds the free list, dropping buffers
//! beyond the retention limit and shrinking any that ballooned.

use std::sync::Weak;

use parking_lot::Mutex;

use super::undo::Undo;

/// Buffers retained in the free list.
const POOL_RETENTION: usize = 64;
/// Initial capacity handed out with a fresh buffer.
const BUFFER_CAPACITY: usize = 16;
/// Buffers larger than this are shrunk during a cleanup pass.
const BUFFER_SHRINK_LIMIT: usize = 256;

/// The undo-log entries a transaction keeps for its rollback walk.
pub type UndoLog = Vec<Weak<Undo>>;

/// A free list of recycled undo logs.
#[derive(Default)]
pub struct TransactionPool {
    free: Mutex<Vec<UndoLog>>,
}

impl TransactionPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a cleared buffer, recycling one when available.
    pub fn acquire(&self) -> UndoLog {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(BUFFER_CAPACITY))
    }

    /// Returns a buffer to the free list.
    pub fn release(&self, mut buffer: UndoLog) {
        buffer.clear();
        let mut free = self.free.lock();
        if free.len() < POOL_RETENTION {
            free.push(buffer);
        }
    }

    /// Rebuilds the free list: shrinks oversized buffers and trims the list
    /// back to the retention limit. Returns the number of buffers touched.
    pub fn cleanup(&self) -> usize {
        let mut free = self.free.lock();
        let mut touched = free.len().saturating_sub(POOL_RETENTION);
        free.truncate(POOL_RETENTION);
        for buffer in free.iter_mut() {
            if buffer.capacity() > BUFFER_SHRINK_LIMIT {
                buffer.shrink_to(BUFFER_CAPACITY);
                touched += 1;
            }
        }
        touched
    }

    /// Buffers currently parked in the free list.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether the free list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
