//! The garbage-collection handle owned by a thread context.

use std::sync::Arc;

use parking_lot::Mutex;

use super::collector::GarbageCollector;
use super::item::{Deleter, Item};
use super::queue::SimpleQueue;

/// The queue pair shared between a thread context and a garbage collector.
///
/// Marking goes through the thread's own shared queue, so the common path
/// contends only with the collector's periodic pass. On release the queue is
/// handed back to the collector, which adopts it as an orphan.
pub struct TcQueue {
    shared: Option<Arc<Mutex<SimpleQueue>>>,
    gc: Arc<GarbageCollector>,
}

impl TcQueue {
    /// Creates a queue pair against the given collector.
    pub fn new(gc: Arc<GarbageCollector>) -> Self {
        let shared = gc.create_shared_queue();
        Self {
            shared: Some(shared),
            gc,
        }
    }

    /// Marks an object for deferred release at the current global epoch.
    pub fn mark(&self, epoch_now: u64, deleter: Deleter) {
        match &self.shared {
            Some(queue) => queue.lock().push(Item::new(epoch_now, deleter)),
            // Released queues can no longer accept entries; fall back to the
            // collector's internal queue.
            None => self.gc.mark(deleter),
        }
    }

    /// Hands the queue back to the collector. No objects can be marked
    /// through this instance afterwards.
    pub fn release(&mut self) {
        if let Some(queue) = self.shared.take() {
            self.gc.unregister(&queue);
        }
    }
}

impl Drop for TcQueue {
    fn drop(&mut self) {
        self.release();
    }
}
