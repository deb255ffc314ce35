//! Per-thread state.
//!
//! Every thread that touches the engine owns a [`ThreadContext`]: its epoch
//! slot, its garbage-collection queue, the list of transactions it started
//! and a cached snapshot of the globally active transactions. The context is
//! installed thread-locally by [`GlobalContext::register_thread`] and handed
//! around by `Arc`, so transactions keep their birth context alive even when
//! the thread itself unregisters.
//!
//! [`GlobalContext::register_thread`]: super::global::GlobalContext::register_thread

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{GraphError, Result};
use crate::gc::{Deleter, TcQueue};
use crate::transaction::{
    TransactionImpl, TransactionList, TransactionPool, TransactionSequence,
};

use super::epoch::EpochSlot;
use super::global::GlobalContext;
use super::property::{GraphProperty, PropertySnapshot, PropertySnapshotList};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Per-thread engine state.
pub struct ThreadContext {
    global: Weak<GlobalContext>,
    context_id: u64,
    epoch: EpochSlot,
    epoch_depth: AtomicU32,
    gc_queue: Mutex<TcQueue>,
    tx_list: TransactionList,
    tx_seq_cache: Mutex<Option<Arc<TransactionSequence>>>,
    prop_list: PropertySnapshotList,
    txn_pool: Arc<TransactionPool>,
}

impl ThreadContext {
    pub(crate) fn new(global: &Arc<GlobalContext>) -> Self {
        Self {
            global: Arc::downgrade(global),
            context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            epoch: EpochSlot::new(),
            epoch_depth: AtomicU32::new(0),
            gc_queue: Mutex::new(TcQueue::new(global.gc())),
            tx_list: TransactionList::new(),
            tx_seq_cache: Mutex::new(None),
            prop_list: PropertySnapshotList::new(),
            txn_pool: global.runtime().transaction_pool(),
        }
    }

    /// The owning global context, unless the database already shut down.
    pub fn global(&self) -> Option<Arc<GlobalContext>> {
        self.global.upgrade()
    }

    pub(crate) fn belongs_to(&self, global: &Arc<GlobalContext>) -> bool {
        std::ptr::eq(self.global.as_ptr(), Arc::as_ptr(global))
    }

    /// A unique identifier, for diagnostics.
    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// The epoch currently published by this context.
    pub fn epoch(&self) -> u64 {
        self.epoch.current()
    }

    /// Pins the thread inside an epoch for the lifetime of the guard.
    /// Nested guards share the outermost epoch.
    pub fn epoch_guard(&self) -> ScopedEpoch<'_> {
        if self.epoch_depth.fetch_add(1, Ordering::AcqRel) == 0 {
            let now = self.global().map_or(0, |global| global.now());
            self.epoch.enter(now);
        }
        ScopedEpoch { context: self }
    }

    /// Marks an object for epoch-deferred release.
    pub fn mark(&self, deleter: Deleter) {
        let now = self.global().map_or(0, |global| global.now());
        self.gc_queue.lock().mark(now, deleter);
    }

    /// Starts a new transaction in this context.
    pub fn start_transaction(
        self: &Arc<Self>,
        read_only: bool,
    ) -> Result<Arc<TransactionImpl>> {
        let global = self
            .global()
            .ok_or_else(|| GraphError::logical("the database has been shut down"))?;
        let start_ts = global.next_timestamp();
        let transaction = Arc::new(TransactionImpl::new(
            Arc::clone(self),
            start_ts,
            read_only,
            self.txn_pool.acquire(),
        ));
        self.tx_list.insert(Arc::clone(&transaction))?;
        trace!(start_ts, read_only, "transaction started");
        Ok(transaction)
    }

    pub(crate) fn unregister_transaction(&self, transaction: &TransactionImpl) {
        self.tx_list.remove(transaction);
    }

    /// The snapshot of active transactions, cached until the timer service
    /// resets it.
    pub fn active_transactions(&self) -> Arc<TransactionSequence> {
        let mut cache = self.tx_seq_cache.lock();
        if let Some(sequence) = &*cache {
            return Arc::clone(sequence);
        }
        let sequence = match self.global() {
            Some(global) => global.active_transactions(),
            None => Arc::new(TransactionSequence::new(Vec::new())),
        };
        *cache = Some(Arc::clone(&sequence));
        sequence
    }

    /// Drops the cached snapshot. The replaced sequence is handed to the
    /// garbage collector: an optimistic reader may still hold it.
    pub fn reset_active_transactions_cache(&self) {
        let taken = self.tx_seq_cache.lock().take();
        if let Some(sequence) = taken {
            self.mark(Box::new(move || drop(sequence)));
        }
    }

    /// Records a committed property delta in this context's list.
    pub fn save_local_changes(&self, delta: GraphProperty, commit_ts: u64) {
        let active = self.tx_seq_cache.lock().clone();
        self.prop_list.insert(
            PropertySnapshot {
                transaction_id: commit_ts,
                property: delta,
            },
            active.as_deref(),
        );
    }

    pub(crate) fn prop_list(&self) -> &PropertySnapshotList {
        &self.prop_list
    }

    pub(crate) fn tx_list(&self) -> &TransactionList {
        &self.tx_list
    }

    /// The undo-log pool this context allocates from.
    pub fn transaction_pool(&self) -> &Arc<TransactionPool> {
        &self.txn_pool
    }

    pub(crate) fn release_gc_queue(&self) {
        self.gc_queue.lock().release();
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("context_id", &self.context_id)
            .field("epoch", &self.epoch())
            .field("active_transactions", &self.tx_list.len())
            .finish()
    }
}

/// RAII epoch pin. See [`ThreadContext::epoch_guard`].
pub struct ScopedEpoch<'a> {
    context: &'a ThreadContext,
}

impl Drop for ScopedEpoch<'_> {
    fn drop(&mut self) {
        if self.context.epoch_depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.context.epoch.exit();
        }
    }
}
