//! The epoch-based garbage collector.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::context::global::GlobalContext;

use super::item::{Deleter, Item};
use super::queue::SimpleQueue;

/// An instance of the garbage collector. Every worker owns one, so
/// reclamation work spreads across the pool; all instances consult the same
/// global minimum epoch.
pub struct GarbageCollector {
    global: Weak<GlobalContext>,
    /// Internal queue, serving callers that have no thread context.
    local: Mutex<SimpleQueue>,
    /// Queues shared with one registered thread context each.
    shared: Mutex<Vec<Arc<Mutex<SimpleQueue>>>>,
    /// Queues handed back by unregistered thread contexts; drained and then
    /// dropped by subsequent passes.
    orphans: Mutex<Vec<Arc<Mutex<SimpleQueue>>>>,
}

impl GarbageCollector {
    /// Creates a collector bound to the given global context.
    pub fn new(global: Weak<GlobalContext>) -> Self {
        Self {
            global,
            local: Mutex::new(SimpleQueue::new()),
            shared: Mutex::new(Vec::new()),
            orphans: Mutex::new(Vec::new()),
        }
    }

    fn now(&self) -> u64 {
        self.global.upgrade().map_or(0, |g| g.now())
    }

    fn min_epoch(&self) -> u64 {
        self.global.upgrade().map_or(u64::MAX, |g| g.min_epoch())
    }

    /// Marks an object for deferred release.
    ///
    /// The pointer behind `deleter` must already be unreachable from new
    /// readers; threads inside an epoch may keep using it until they exit.
    pub fn mark(&self, deleter: Deleter) {
        let mut local = self.local.lock();
        // Stamped under the lock so the queue stays epoch-ordered even when
        // several contextless threads mark concurrently.
        local.push(Item::new(self.now(), deleter));
    }

    /// Creates a queue shared between this collector and a thread context.
    pub fn create_shared_queue(&self) -> Arc<Mutex<SimpleQueue>> {
        let queue = Arc::new(Mutex::new(SimpleQueue::new()));
        self.shared.lock().push(Arc::clone(&queue));
        queue
    }

    /// Takes back the queue of an unregistering thread context. The queue
    /// becomes an orphan, owned and eventually drained by the collector.
    pub fn unregister(&self, queue: &Arc<Mutex<SimpleQueue>>) {
        let mut shared = self.shared.lock();
        if let Some(position) = shared.iter().position(|q| Arc::ptr_eq(q, queue)) {
            let orphan = shared.swap_remove(position);
            drop(shared);
            self.orphans.lock().push(orphan);
        }
    }

    /// Executes a single reclamation pass.
    pub fn execute(&self) {
        let min_epoch = self.min_epoch();
        let mut released = self.local.lock().reclaim_older_than(min_epoch);

        let shared: Vec<_> = self.shared.lock().iter().cloned().collect();
        for queue in shared {
            released += queue.lock().reclaim_older_than(min_epoch);
        }

        let mut orphans = self.orphans.lock();
        orphans.retain(|queue| {
            let mut guard = queue.lock();
            released += guard.reclaim_older_than(min_epoch);
            !guard.is_empty()
        });
        drop(orphans);

        if released > 0 {
            trace!(released, min_epoch, "gc pass");
        }
    }

    /// Releases everything still queued, regardless of epochs. Only safe
    /// once no reader thread can be inside an epoch.
    pub fn terminate(&self) {
        let mut released = self.local.lock().reclaim_all();
        for queue in self.shared.lock().drain(..) {
            released += queue.lock().reclaim_all();
        }
        for queue in self.orphans.lock().drain(..) {
            released += queue.lock().reclaim_all();
        }
        if released > 0 {
            debug!(released, "gc terminated with pending items");
        }
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.terminate();
    }
}
