//! The background runtime: worker pool plus timer service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::context::global::GlobalContext;
use crate::gc::GarbageCollector;
use crate::memstore::Key;
use crate::transaction::TransactionPool;

use super::queue::Queue;
use super::task::Task;
use super::timer::{TimerEvent, TimerService};
use super::worker;

/// Executes maintenance tasks asynchronously on a fixed set of workers and
/// schedules delayed or periodic work through the timer service.
pub struct Runtime {
    queue: Queue,
    timer: TimerService,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
    gc_pass_interval: Duration,
    txnpool_pass_interval: Duration,
    rebalance_delay: Duration,
}

impl Runtime {
    /// Builds the pool and spawns the worker threads; they idle until
    /// tasks arrive. The timer thread starts with [`Runtime::start`].
    pub fn new(global: Weak<GlobalContext>, config: &Config) -> Runtime {
        let num_workers = config.num_workers.max(1);
        let queue = Queue::new(global.clone(), num_workers);
        let handles = (0..num_workers)
            .map(|worker_id| worker::spawn(Arc::clone(queue.inner()), worker_id))
            .collect();
        Runtime {
            queue,
            timer: TimerService::new(
                global,
                Duration::from_millis(config.txnlist_refresh_interval_ms),
            ),
            handles: Mutex::new(handles),
            stopped: AtomicBool::new(false),
            gc_pass_interval: Duration::from_millis(config.gc_pass_interval_ms),
            txnpool_pass_interval: Duration::from_millis(config.txnpool_pass_interval_ms),
            rebalance_delay: Duration::from_millis(config.rebalance_delay_ms),
        }
    }

    /// Brings the background services up: registers a thread context on
    /// every worker and arms the periodic maintenance events.
    pub fn start(&self, _global: &Arc<GlobalContext>) {
        self.timer.start();
        for worker_id in 0..self.num_workers() {
            self.execute_and_wait(Task::RegisterThreadContext, worker_id);
        }
        for worker_id in 0..self.num_workers() {
            self.queue.submit(Task::GcRun, worker_id);
            self.queue.submit(Task::TxnPoolPass, worker_id);
        }
        self.timer.schedule(
            Duration::from_millis(0),
            TimerEvent::RefreshActiveTransactions,
        );
    }

    /// Stops the timer, unregisters and terminates every worker, and joins
    /// their threads. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("runtime shutting down");
        self.timer.stop();
        for worker_id in 0..self.num_workers() {
            self.execute_and_wait(Task::UnregisterThreadContext, worker_id);
        }
        for worker_id in 0..self.num_workers() {
            self.execute_and_wait(Task::GcTerminate, worker_id);
        }
        self.queue.submit_all(Task::Terminate);
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn execute_and_wait(&self, build: fn(super::task::Ack) -> Task, worker_id: usize) {
        let (ack, done) = mpsc::sync_channel(1);
        self.queue.submit(build(ack), worker_id);
        let _ = done.recv();
    }

    /// Number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.queue.num_workers()
    }

    /// One of the per-worker garbage collectors, picked at random.
    pub fn gc(&self) -> Arc<GarbageCollector> {
        self.queue.worker_gc(self.queue.random_worker_id())
    }

    /// One of the per-worker transaction pools, picked at random.
    pub fn transaction_pool(&self) -> Arc<TransactionPool> {
        self.queue.worker_txn_pool(self.queue.random_worker_id())
    }

    /// Routes a task to the given worker; any negative id picks a random
    /// worker.
    pub fn execute(&self, task: Task, worker_id: i64) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let worker_id = if worker_id < 0 {
            self.queue.random_worker_id()
        } else {
            worker_id as usize % self.num_workers()
        };
        self.queue.submit(task, worker_id);
    }

    /// Schedules a rebalance of the leaf holding `key`, after the
    /// coalescing delay.
    pub fn schedule_rebalance(&self, key: Key) {
        self.timer.schedule(
            self.rebalance_delay,
            TimerEvent::Dispatch {
                task: Task::Rebalance(key),
                worker_id: -1,
            },
        );
    }

    /// Schedules the next garbage-collection pass of a worker.
    pub fn schedule_gc_pass(&self, worker_id: usize) {
        self.timer.schedule(
            self.gc_pass_interval,
            TimerEvent::Dispatch {
                task: Task::GcRun,
                worker_id: worker_id as i64,
            },
        );
    }

    /// Schedules the next transaction-pool pass of a worker.
    pub fn schedule_txnpool_pass(&self, worker_id: usize) {
        self.timer.schedule(
            self.txnpool_pass_interval,
            TimerEvent::Dispatch {
                task: Task::TxnPoolPass,
                worker_id: worker_id as i64,
            },
        );
    }

    /// Allows scheduled rebalances to execute on every worker.
    pub fn enable_rebalance(&self) {
        self.queue.submit_all(Task::EnableRebalance);
    }

    /// Makes every worker ignore scheduled rebalances.
    pub fn disable_rebalance(&self) {
        self.queue.submit_all(Task::DisableRebalance);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
