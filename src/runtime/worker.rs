//! Worker threads.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, trace, warn};

use crate::rebalance;

use super::queue::QueueInner;
use super::task::Task;

/// Spawns worker `worker_id` over the shared queue state.
pub(crate) fn spawn(inner: Arc<QueueInner>, worker_id: usize) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("canopy-worker-{worker_id}"))
        .spawn(move || main_loop(inner, worker_id))
        .expect("spawning a worker thread")
}

fn main_loop(inner: Arc<QueueInner>, worker_id: usize) {
    debug!(worker_id, "worker started");
    let mut rebalance_enabled = false;
    let mut gc_enabled = true;

    loop {
        let task = inner.fetch(worker_id);
        trace!(worker_id, ?task, "worker task");
        match task {
            Task::Nop => {}
            Task::RegisterThreadContext(ack) => {
                if let Some(global) = inner.global.upgrade() {
                    if let Err(err) = global.register_thread() {
                        warn!(worker_id, %err, "worker registration failed");
                    }
                }
                rebalance_enabled = true;
                let _ = ack.send(());
            }
            Task::UnregisterThreadContext(ack) => {
                if let Some(global) = inner.global.upgrade() {
                    let _ = global.unregister_thread();
                }
                rebalance_enabled = false;
                let _ = ack.send(());
            }
            Task::GcRun => {
                if gc_enabled {
                    inner.workers[worker_id].gc.execute();
                    if let Some(global) = inner.global.upgrade() {
                        global.runtime().schedule_gc_pass(worker_id);
                    }
                }
            }
            Task::GcStop(ack) => {
                gc_enabled = false;
                let _ = ack.send(());
            }
            Task::GcTerminate(ack) => {
                inner.workers[worker_id].gc.terminate();
                gc_enabled = false;
                let _ = ack.send(());
            }
            Task::TxnPoolPass => {
                inner.workers[worker_id].txn_pool.cleanup();
                if let Some(global) = inner.global.upgrade() {
                    global.runtime().schedule_txnpool_pass(worker_id);
                }
            }
            Task::EnableRebalance => rebalance_enabled = true,
            Task::DisableRebalance => rebalance_enabled = false,
            Task::Rebalance(key) => {
                if rebalance_enabled {
                    if let Some(global) = inner.global.upgrade() {
                        rebalance::handle_rebalance(global.memstore(), key);
                    }
                } else {
                    trace!(worker_id, %key, "rebalance request ignored");
                }
            }
            Task::Terminate => break,
        }
    }
    debug!(worker_id, "worker stopped");
}
