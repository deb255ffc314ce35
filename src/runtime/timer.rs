//! The timer service.
//!
//! One background thread owns a monotonic min-heap of (deadline, event)
//! pairs. Events either dispatch a task to the worker pool or refresh the
//! cached active-transaction snapshots; long-running work never executes on
//! the timer thread itself.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::context::global::GlobalContext;

use super::task::Task;

/// What fires when a deadline is reached.
#[derive(Debug, Clone)]
pub enum TimerEvent {
    /// Route a task to the worker pool. Negative ids pick a random worker.
    Dispatch {
        /// The task to submit.
        task: Task,
        /// Destination worker, or any negative value for "any".
        worker_id: i64,
    },
    /// Drop every thread's cached active-transaction snapshot, then re-arm.
    RefreshActiveTransactions,
}

struct TimerEntry {
    due: Instant,
    sequence: u64,
    event: TimerEvent,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.sequence).cmp(&(other.due, other.sequence))
    }
}

struct TimerInner {
    global: Weak<GlobalContext>,
    heap: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
    condvar: Condvar,
    stopped: AtomicBool,
    sequence: AtomicU64,
    refresh_interval: Duration,
}

/// The timer service handle.
pub struct TimerService {
    inner: Arc<TimerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    pub(crate) fn new(global: Weak<GlobalContext>, refresh_interval: Duration) -> TimerService {
        TimerService {
            inner: Arc::new(TimerInner {
                global,
                heap: Mutex::new(BinaryHeap::new()),
                condvar: Condvar::new(),
                stopped: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                refresh_interval,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Starts the timer thread.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *handle = Some(
            std::thread::Builder::new()
                .name("canopy-timer".into())
                .spawn(move || timer_main(inner))
                .expect("spawning the timer thread"),
        );
    }

    /// Schedules `event` to fire after `delay`. Dropped silently once the
    /// service is stopped.
    pub fn schedule(&self, delay: Duration, event: TimerEvent) {
        if self.inner.stopped.load(Ordering::Acquire) {
            return;
        }
        let entry = TimerEntry {
            due: Instant::now() + delay,
            sequence: self.inner.sequence.fetch_add(1, Ordering::Relaxed),
            event,
        };
        self.inner.heap.lock().push(Reverse(entry));
        self.inner.condvar.notify_all();
    }

    /// Stops the thread, dropping every pending event.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.inner.heap.lock().clear();
    }
}

fn timer_main(inner: Arc<TimerInner>) {
    debug!("timer started");
    loop {
        let fired = {
            let mut heap = inner.heap.lock();
            if inner.stopped.load(Ordering::Acquire) {
                break;
            }
            match heap.peek() {
                None => {
                    inner.condvar.wait(&mut heap);
                    None
                }
                Some(Reverse(entry)) => {
                    let now = Instant::now();
                    if entry.due <= now {
                        heap.pop().map(|Reverse(entry)| entry.event)
                    } else {
                        let timeout = entry.due - now;
                        inner.condvar.wait_for(&mut heap, timeout);
                        None
                    }
                }
            }
        };
        if let Some(event) = fired {
            fire(&inner, event);
        }
    }
    debug!("timer stopped");
}

fn fire(inner: &Arc<TimerInner>, event: TimerEvent) {
    trace!(?event, "timer event");
    let Some(global) = inner.global.upgrade() else {
        return;
    };
    match event {
        TimerEvent::Dispatch { task, worker_id } => {
            global.runtime().execute(task, worker_id);
        }
        TimerEvent::RefreshActiveTransactions => {
            global.refresh_active_transactions();
            if !inner.stopped.load(Ordering::Acquire) {
                let entry = TimerEntry {
                    due: Instant::now() + inner.refresh_interval,
                    sequence: inner.sequence.fetch_add(1, Ordering::Relaxed),
                    event: TimerEvent::RefreshActiveTransactions,
                };
                inner.heap.lock().push(Reverse(entry));
                inner.condvar.notify_all();
            }
        }
    }
}
