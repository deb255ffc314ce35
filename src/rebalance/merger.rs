//! The merger service: a background thread that periodically walks the
//! leaf directory and merges adjacent, underfilled leaves.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::context::global::GlobalContext;
use crate::memstore::key::KEY_MIN;
use crate::memstore::Memstore;

use super::operator::merge_pair;
use super::plan;

struct MergerShared {
    memstore: Weak<Memstore>,
    global: Weak<GlobalContext>,
    interval: Duration,
    stop: Mutex<bool>,
    condvar: Condvar,
}

/// Handle to the background merger thread.
pub struct MergerService {
    shared: Arc<MergerShared>,
    handle: JoinHandle<()>,
}

impl MergerService {
    /// Spawns the merger thread, firing every `interval`.
    pub(crate) fn start(
        memstore: Weak<Memstore>,
        global: Weak<GlobalContext>,
        interval: Duration,
    ) -> MergerService {
        let shared = Arc::new(MergerShared {
            memstore,
            global,
            interval,
            stop: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("canopy-merger".into())
            .spawn(move || merger_main(thread_shared))
            .expect("spawning the merger thread");
        MergerService { shared, handle }
    }

    /// Stops the thread and waits for it to finish.
    pub(crate) fn stop(self) {
        *self.shared.stop.lock() = true;
        self.shared.condvar.notify_all();
        let _ = self.handle.join();
    }
}

fn merger_main(shared: Arc<MergerShared>) {
    debug!("merger started");
    if let Some(global) = shared.global.upgrade() {
        let _ = global.register_thread();
    }

    loop {
        {
            let mut stop = shared.stop.lock();
            if *stop {
                break;
            }
            shared.condvar.wait_for(&mut stop, shared.interval);
            if *stop {
                break;
            }
        }
        let Some(memstore) = shared.memstore.upgrade() else {
            break;
        };
        let merged = merge_pass(&memstore);
        if merged > 0 {
            debug!(merged, "merger pass");
        }
    }

    if let Some(global) = shared.global.upgrade() {
        let _ = global.unregister_thread();
    }
    debug!("merger stopped");
}

/// Scans the directory once, merging every adjacent pair of jointly
/// underfilled leaves. Returns the number of merges performed. Also
/// callable directly, for deterministic tests.
pub fn merge_pass(memstore: &Memstore) -> usize {
    let capacity = plan::leaf_capacity(memstore.caps(), memstore.leaf_segments());
    let mut merged = 0;
    let mut key = KEY_MIN;
    loop {
        let left = memstore.index().find(key);
        let Some(right) = memstore.index().next_leaf(left.lo()) else {
            break;
        };
        let advance = right.lo();
        if plan::merge_candidate(left.fill_estimate(), right.fill_estimate(), capacity)
            && merge_pair(memstore, &left, &right)
        {
            merged += 1;
            trace!(lo = %left.lo(), "merged pair");
        }
        key = advance;
    }
    merged
}
