//! Tasks executed by the worker pool.

use std::sync::mpsc::SyncSender;

use crate::memstore::Key;

/// Acknowledgement channel for tasks the submitter waits on.
pub type Ack = SyncSender<()>;

/// A single task sent to a worker.
#[derive(Clone)]
pub enum Task {
    /// Ignore.
    Nop,
    /// Register a thread context for the worker thread itself; enables
    /// rebalance handling on that worker.
    RegisterThreadContext(Ack),
    /// Unregister the worker's thread context.
    UnregisterThreadContext(Ack),
    /// Execute a single pass of the worker's garbage collector.
    GcRun,
    /// Stop the periodic garbage-collection passes.
    GcStop(Ack),
    /// Drain the worker's garbage collector entirely and stop it.
    GcTerminate(Ack),
    /// Rebuild the free lists of the worker's transaction pool.
    TxnPoolPass,
    /// Allow rebalance tasks to execute.
    EnableRebalance,
    /// Ignore rebalance tasks from now on.
    DisableRebalance,
    /// Rebalance the leaf currently holding `Key`.
    Rebalance(Key),
    /// Terminate the worker thread.
    Terminate,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Nop => write!(f, "Nop"),
            Task::RegisterThreadContext(_) => write!(f, "RegisterThreadContext"),
            Task::UnregisterThreadContext(_) => write!(f, "UnregisterThreadContext"),
            Task::GcRun => write!(f, "GcRun"),
            Task::GcStop(_) => write!(f, "GcStop"),
            Task::GcTerminate(_) => write!(f, "GcTerminate"),
            Task::TxnPoolPass => write!(f, "TxnPoolPass"),
            Task::EnableRebalance => write!(f, "EnableRebalance"),
            Task::DisableRebalance => write!(f, "DisableRebalance"),
            Task::Rebalance(key) => write!(f, "Rebalance({key})"),
            Task::Terminate => write!(f, "Terminate"),
        }
    }
}
