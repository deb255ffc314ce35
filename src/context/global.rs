//! The process-wide engine context.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::epoch::EPOCH_IDLE;
use crate::error::{GraphError, Result};
use crate::gc::GarbageCollector;
use crate::memstore::Memstore;
use crate::runtime::Runtime;
use crate::transaction::TransactionSequence;

use super::property::{GraphProperty, PropertySnapshotList};
use super::thread::ThreadContext;

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadContext>>> = const { RefCell::new(None) };
}

/// The root of one engine instance: the timestamp stream, the registry of
/// thread contexts, the storage tree and the background runtime.
///
/// Created once per database and passed explicitly through constructors;
/// only the per-thread context is held in thread-local storage.
pub struct GlobalContext {
    config: Config,
    start: Instant,
    clock: AtomicU64,
    registry: RwLock<Vec<Arc<ThreadContext>>>,
    /// Property lists inherited from unregistered thread contexts.
    orphan_props: PropertySnapshotList,
    runtime: Runtime,
    memstore: Arc<Memstore>,
    stopped: AtomicBool,
}

impl GlobalContext {
    /// Builds the engine. Background threads exist but stay idle until
    /// [`GlobalContext::start`] is called.
    pub fn new(config: Config) -> Arc<GlobalContext> {
        Arc::new_cyclic(|weak| GlobalContext {
            start: Instant::now(),
            clock: AtomicU64::new(0),
            registry: RwLock::new(Vec::new()),
            orphan_props: PropertySnapshotList::new(),
            runtime: Runtime::new(weak.clone(), &config),
            memstore: Arc::new(Memstore::new(weak.clone(), &config)),
            stopped: AtomicBool::new(false),
            config,
        })
    }

    /// Brings the background services up: worker thread contexts, periodic
    /// garbage collection, pool maintenance, snapshot refresh, the merger.
    pub fn start(self: &Arc<Self>) {
        self.runtime.start(self);
        self.memstore.start_merger(self);
        info!(
            workers = self.config.num_workers,
            directed = self.config.directed,
            "engine started"
        );
    }

    /// Stops every background service and clears the storage. Idempotent.
    pub fn shutdown(self: &Arc<Self>) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("engine shutting down");
        self.memstore.stop_merger();
        self.runtime.shutdown();
        self.memstore.clear();
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The storage tree.
    pub fn memstore(&self) -> &Arc<Memstore> {
        &self.memstore
    }

    /// The background runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// A garbage collector instance (each worker owns one; callers get one
    /// of them).
    pub fn gc(&self) -> Arc<GarbageCollector> {
        self.runtime.gc()
    }

    /// Nanoseconds since the engine was created; the epoch clock.
    pub fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    /// Draws the next timestamp from the shared start/commit stream.
    pub fn next_timestamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel)
    }

    /// The next timestamp that would be issued, without issuing it.
    pub fn current_timestamp(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Registers the calling thread, or returns its existing context.
    pub fn register_thread(self: &Arc<Self>) -> Result<Arc<ThreadContext>> {
        CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if let Some(existing) = &*slot {
                if existing.belongs_to(self) {
                    return Ok(Arc::clone(existing));
                }
                return Err(GraphError::logical(
                    "this thread is already registered with another database",
                ));
            }
            let context = Arc::new(ThreadContext::new(self));
            self.registry.write().push(Arc::clone(&context));
            *slot = Some(Arc::clone(&context));
            debug!(context_id = context.context_id(), "thread registered");
            Ok(context)
        })
    }

    /// Unregisters the calling thread: its property list is inherited by
    /// the global orphan list and its GC queue is handed to the collector.
    pub fn unregister_thread(self: &Arc<Self>) -> Result<()> {
        let context = CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            match slot.as_ref() {
                None => return Err(GraphError::logical("this thread is not registered")),
                Some(existing) if !existing.belongs_to(self) => {
                    return Err(GraphError::logical(
                        "this thread is registered with another database",
                    ));
                }
                Some(_) => {}
            }
            Ok(slot.take().expect("present"))
        })?;

        if !context.tx_list().is_empty() {
            warn!(
                context_id = context.context_id(),
                live = context.tx_list().len(),
                "thread unregistered with live transactions"
            );
        }

        self.registry
            .write()
            .retain(|c| !std::ptr::eq(Arc::as_ptr(c), Arc::as_ptr(&context)));
        self.orphan_props.acquire(context.prop_list());
        context.reset_active_transactions_cache();
        context.release_gc_queue();
        debug!(context_id = context.context_id(), "thread unregistered");
        Ok(())
    }

    /// The calling thread's context, registering it on first use.
    pub fn thread_context(self: &Arc<Self>) -> Result<Arc<ThreadContext>> {
        let existing = CURRENT.with(|cell| {
            cell.borrow()
                .as_ref()
                .filter(|context| context.belongs_to(self))
                .cloned()
        });
        match existing {
            Some(context) => Ok(context),
            None => self.register_thread(),
        }
    }

    /// The minimum epoch over every registered thread; idle threads do not
    /// hold reclamation back.
    pub fn min_epoch(&self) -> u64 {
        self.registry
            .read()
            .iter()
            .map(|context| context.epoch())
            .filter(|&epoch| epoch != EPOCH_IDLE)
            .min()
            .unwrap_or(u64::MAX)
    }

    /// A fresh snapshot of every active transaction, plus the next unissued
    /// timestamp as the upper sentinel. Sorted descending.
    pub fn active_transactions(&self) -> Arc<TransactionSequence> {
        let mut ids = vec![self.current_timestamp()];
        for context in self.registry.read().iter() {
            context.tx_list().snapshot_ids(&mut ids);
        }
        Arc::new(TransactionSequence::new(ids))
    }

    /// The smallest start timestamp among active transactions, or the next
    /// unissued timestamp when none is active.
    pub fn high_water_mark(&self) -> u64 {
        self.active_transactions().high_water_mark()
    }

    /// Materialises the graph properties visible at `transaction_id`.
    pub fn property_snapshot(&self, transaction_id: u64) -> GraphProperty {
        let mut total = self.orphan_props.snapshot(transaction_id);
        for context in self.registry.read().iter() {
            total += context.prop_list().snapshot(transaction_id);
        }
        total
    }

    /// Drops the cached active-transaction snapshot of every registered
    /// thread. Invoked periodically by the timer service.
    pub fn refresh_active_transactions(&self) {
        for context in self.registry.read().iter() {
            context.reset_active_transactions_cache();
        }
    }
}

impl std::fmt::Debug for GlobalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalContext")
            .field("clock", &self.current_timestamp())
            .field("threads", &self.registry.read().len())
            .finish()
    }
}
