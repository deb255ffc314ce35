//! A single deferred deallocation.

/// The deallocation callback attached to a retired object.
pub type Deleter = Box<dyn FnOnce() + Send>;

/// One entry in a garbage-collection queue: the epoch at which the object
/// was retired, plus the closure that releases it.
pub struct Item {
    epoch: u64,
    deleter: Option<Deleter>,
}

impl Item {
    /// Creates an entry retired at `epoch`.
    pub fn new(epoch: u64, deleter: Deleter) -> Self {
        Self {
            epoch,
            deleter: Some(deleter),
        }
    }

    /// The epoch at which the object was retired.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Runs the deleter. Idempotent: a second call is a no-op.
    pub fn process(&mut self) {
        if let Some(deleter) = self.deleter.take() {
            deleter();
        }
    }

    /// Runs the deleter only if the entry was retired strictly before
    /// `epoch`. Returns whether the entry was processed.
    pub fn process_if(&mut self, epoch: u64) -> bool {
        if self.epoch < epoch {
            self.process();
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("epoch", &self.epoch)
            .field("pending", &self.deleter.is_some())
            .finish()
    }
}
