//! Per-worker task queues.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::context::global::GlobalContext;
use crate::gc::GarbageCollector;
use crate::transaction::TransactionPool;

use super::task::Task;

/// Queue, wake-up channel and per-worker services of one worker.
pub(crate) struct WorkerChannel {
    pub queue: Mutex<VecDeque<Task>>,
    pub condvar: Condvar,
    pub gc: Arc<GarbageCollector>,
    pub txn_pool: Arc<TransactionPool>,
}

/// Shared state between the queue facade and the worker threads.
pub(crate) struct QueueInner {
    pub global: Weak<GlobalContext>,
    pub workers: Box<[WorkerChannel]>,
}

impl QueueInner {
    /// Blocks until a task is available for `worker_id`.
    pub fn fetch(&self, worker_id: usize) -> Task {
        let channel = &self.workers[worker_id];
        let mut queue = channel.queue.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                return task;
            }
            channel.condvar.wait(&mut queue);
        }
    }
}

/// The worker pool's submission side.
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Queue {
    pub(crate) fn new(global: Weak<GlobalContext>, num_workers: usize) -> Queue {
        let workers: Vec<WorkerChannel> = (0..num_workers)
            .map(|_| WorkerChannel {
                queue: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
                gc: Arc::new(GarbageCollector::new(global.clone())),
                txn_pool: Arc::new(TransactionPool::new()),
            })
            .collect();
        Queue {
            inner: Arc::new(QueueInner {
                global,
                workers: workers.into_boxed_slice(),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<QueueInner> {
        &self.inner
    }

    /// Number of workers.
    pub fn num_workers(&self) -> usize {
        self.inner.workers.len()
    }

    /// A uniformly random worker id.
    pub fn random_worker_id(&self) -> usize {
        rand::thread_rng().gen_range(0..self.num_workers())
    }

    /// Appends `task` to the worker's queue and wakes it.
    pub fn submit(&self, task: Task, worker_id: usize) {
        let channel = &self.inner.workers[worker_id];
        channel.queue.lock().push_back(task);
        channel.condvar.notify_one();
    }

    /// Submits a copy of `task` to every worker.
    pub fn submit_all(&self, task: Task) {
        for worker_id in 0..self.num_workers() {
            self.submit(task.clone(), worker_id);
        }
    }

    /// The garbage collector owned by the given worker.
    pub fn worker_gc(&self, worker_id: usize) -> Arc<GarbageCollector> {
        Arc::clone(&self.inner.workers[worker_id].gc)
    }

    /// The transaction pool owned by the given worker.
    pub fn worker_txn_pool(&self, worker_id: usize) -> Arc<TransactionPool> {
        Arc::clone(&self.inner.workers[worker_id].txn_pool)
    }
}
