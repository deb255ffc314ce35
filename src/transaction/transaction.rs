//! The transaction implementation.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::property::GraphProperty;
use crate::context::thread::ThreadContext;
use crate::error::{GraphError, Result};
use crate::memstore::update::Update;

use super::pool::UndoLog;
use super::undo::Undo;

/// Added to the start timestamp of a pending (or errored) transaction to
/// form its write timestamp, so that no reader's start timestamp can ever
/// exceed it. Encodes "slot locked" in a single word.
pub const TS_LOCKED_BIAS: u64 = u64::MAX >> 1;

/// Lifecycle state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    /// Live; reads and writes are accepted.
    Pending,
    /// A write left the transaction partially applied; only rollback is
    /// accepted.
    Error,
    /// Terminated by commit.
    Committed,
    /// Terminated by rollback.
    Aborted,
}

impl TxState {
    fn from_u8(value: u8) -> TxState {
        match value {
            0 => TxState::Pending,
            1 => TxState::Error,
            2 => TxState::Committed,
            _ => TxState::Aborted,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TxState::Pending => 0,
            TxState::Error => 1,
            TxState::Committed => 2,
            TxState::Aborted => 3,
        }
    }
}

/// A transaction.
///
/// `id` starts as the start timestamp and is replaced by the commit
/// timestamp on commit; `ts_read`/`ts_write` derive both visibility roles
/// from it. The undo log holds weak references only: strong references to
/// undo records live in the version slots of the storage, so a record stays
/// alive exactly as long as some slot or reader can reach it.
pub struct TransactionImpl {
    thread_context: Arc<ThreadContext>,
    latch: Mutex<()>,
    id: AtomicU64,
    state: AtomicU8,
    undo_log: Mutex<UndoLog>,
    prop_local: Mutex<GraphProperty>,
    prop_global: Mutex<Option<GraphProperty>>,
    ref_count_user: AtomicI64,
    iterators_open: AtomicU32,
    read_only: bool,
}

impl TransactionImpl {
    pub(crate) fn new(
        thread_context: Arc<ThreadContext>,
        start_ts: u64,
        read_only: bool,
        undo_log: UndoLog,
    ) -> Self {
        Self {
            thread_context,
            latch: Mutex::new(()),
            id: AtomicU64::new(start_ts),
            state: AtomicU8::new(TxState::Pending.as_u8()),
            undo_log: Mutex::new(undo_log),
            prop_local: Mutex::new(GraphProperty::default()),
            prop_global: Mutex::new(None),
            ref_count_user: AtomicI64::new(0),
            iterators_open: AtomicU32::new(0),
            read_only,
        }
    }

    /// The thread context that created this transaction.
    pub fn thread_context(&self) -> &Arc<ThreadContext> {
        &self.thread_context
    }

    /// Whether the transaction was started read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Start timestamp while pending, commit timestamp afterwards.
    pub fn ts_read(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    /// The timestamp other transactions compare against for write conflicts:
    /// biased past every possible read timestamp while the transaction can
    /// still change its mind.
    pub fn ts_write(&self) -> u64 {
        match self.state() {
            TxState::Pending | TxState::Error => self.ts_read() + TS_LOCKED_BIAS,
            TxState::Committed | TxState::Aborted => self.ts_read(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        TxState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the transaction terminated (committed or aborted).
    pub fn is_terminated(&self) -> bool {
        matches!(self.state(), TxState::Committed | TxState::Aborted)
    }

    /// Whether the transaction is in the error state.
    pub fn is_error(&self) -> bool {
        self.state() == TxState::Error
    }

    /// Whether the transaction committed.
    pub fn is_committed(&self) -> bool {
        self.state() == TxState::Committed
    }

    /// Moves a pending transaction into the error state. Called after a
    /// failed write left earlier changes of the same operation applied.
    pub fn set_error(&self) {
        let _ = self.state.compare_exchange(
            TxState::Pending.as_u8(),
            TxState::Error.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Whether this transaction owns the given undo record.
    pub fn owns(&self, undo: &Arc<Undo>) -> bool {
        std::ptr::eq(Arc::as_ptr(undo.owner()), self)
    }

    /// Whether this transaction may overwrite a slot whose version chain
    /// starts at `head`.
    pub fn can_write(&self, head: Option<&Arc<Undo>>) -> bool {
        match head {
            None => true,
            Some(undo) => self.owns(undo) || self.ts_read() > undo.owner().ts_write(),
        }
    }

    /// Appends an undo record with the given pre-image, linked in front of
    /// `next`, and remembers it for the rollback walk.
    pub fn add_undo(
        self: &Arc<Self>,
        payload: Update,
        next: Option<Arc<Undo>>,
    ) -> Arc<Undo> {
        let undo = Undo::link(Arc::clone(self), payload, next);
        self.undo_log.lock().push(Arc::downgrade(&undo));
        undo
    }

    /// Folds a local property delta into the transaction.
    pub fn record_local_change(&self, delta: GraphProperty) {
        *self.prop_local.lock() += delta;
    }

    /// The graph properties as seen by this transaction: the committed
    /// global snapshot at `ts_read`, plus the local uncommitted delta.
    pub fn graph_properties(&self) -> Result<GraphProperty> {
        let mut cached = self.prop_global.lock();
        if cached.is_none() {
            let global = self
                .thread_context
                .global()
                .ok_or_else(|| GraphError::logical("the database has been shut down"))?;
            let _epoch = self.thread_context.epoch_guard();
            *cached = Some(global.property_snapshot(self.ts_read()));
        }
        let global_part = (*cached).expect("populated above");
        Ok(global_part + *self.prop_local.lock())
    }

    pub(crate) fn iterator_opened(&self) {
        self.iterators_open.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn iterator_closed(&self) {
        let prev = self.iterators_open.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "iterator count underflow");
    }

    fn check_not_iterating(&self) -> Result<()> {
        if self.iterators_open.load(Ordering::Acquire) > 0 {
            return Err(GraphError::logical(
                "The transaction cannot be terminated while there are open iterators",
            ));
        }
        Ok(())
    }

    /// Commits the transaction: draws a commit timestamp, publishes the
    /// local property delta and flips the state.
    pub fn commit(&self) -> Result<()> {
        let _latch = self.latch.lock();
        if self.is_terminated() {
            return Err(GraphError::logical("This transaction is already terminated"));
        }
        if self.is_error() {
            return Err(GraphError::logical(
                "The transaction must be rolled back as it is in an error state",
            ));
        }
        self.check_not_iterating()?;

        let global = self
            .thread_context
            .global()
            .ok_or_else(|| GraphError::logical("the database has been shut down"))?;
        let commit_ts = global.next_timestamp();

        let delta = *self.prop_local.lock();
        if delta.is_change() {
            let _epoch = self.thread_context.epoch_guard();
            self.thread_context.save_local_changes(delta, commit_ts);
        }

        // Publish the commit timestamp before the state flip: a concurrent
        // ts_write() that already observes COMMITTED must read the final id.
        self.id.store(commit_ts, Ordering::Release);
        self.state
            .store(TxState::Committed.as_u8(), Ordering::Release);
        debug!(commit_ts, "transaction committed");
        Ok(())
    }

    /// Rolls the transaction back, undoing every change newest-first.
    pub fn rollback(&self) -> Result<()> {
        let _latch = self.latch.lock();
        if self.is_terminated() {
            return Err(GraphError::logical("This transaction is already terminated"));
        }
        self.check_not_iterating()?;
        self.do_rollback();
        Ok(())
    }

    fn do_rollback(&self) {
        let entries: Vec<_> = self.undo_log.lock().drain(..).collect();
        if let Some(global) = self.thread_context.global() {
            let _epoch = self.thread_context.epoch_guard();
            let memstore = global.memstore();
            for weak in entries.iter().rev() {
                if let Some(undo) = weak.upgrade() {
                    memstore.do_rollback(&undo);
                }
            }
        } else if !entries.is_empty() {
            warn!("rollback after shutdown discards {} undo records", entries.len());
        }
        self.state.store(TxState::Aborted.as_u8(), Ordering::Release);
    }

    /// Increments the user reference count.
    pub fn incr_user_count(&self) {
        self.ref_count_user.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the user reference count. When the last user reference
    /// goes away the transaction is rolled back if still live and removed
    /// from its thread's active list.
    pub fn decr_user_count(self: &Arc<Self>) {
        if self.ref_count_user.fetch_sub(1, Ordering::AcqRel) == 1 {
            if !self.is_terminated() {
                let _latch = self.latch.lock();
                if !self.is_terminated() {
                    debug!(start_ts = self.ts_read(), "unreachable transaction rolled back");
                    self.do_rollback();
                }
            }
            self.thread_context.unregister_transaction(self);
        }
    }
}

impl Drop for TransactionImpl {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut *self.undo_log.lock());
        self.thread_context.transaction_pool().release(buffer);
    }
}

impl std::fmt::Debug for TransactionImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("ts_read", &self.ts_read())
            .field("ts_write", &self.ts_write())
            .field("state", &self.state())
            .finish()
    }
}
