//! Scratch copies of live records taken during a rebalance.

use crate::memstore::segment::Element;
use crate::memstore::{File, Leaf};
use crate::memstore::key::KEY_MIN;
use crate::transaction::{prune, TransactionSequence};

/// Collects the surviving elements of latched segments, pruning each
/// element's version chain on the way. Tombstones whose chains prune away
/// entirely are garbage and are not copied.
#[derive(Default)]
pub(crate) struct ScratchPad {
    elements: Vec<Element>,
}

impl ScratchPad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every surviving element of the leaf, in key order. The caller
    /// must hold the rebalancer latch on every segment.
    pub fn collect_leaf(&mut self, leaf: &Leaf, active: &TransactionSequence) {
        for segment in leaf.segments() {
            let body = segment.body.read();
            match &body.file {
                File::Sparse(sparse) => {
                    for element in sparse.iter() {
                        self.push_pruned(element.clone(), active);
                    }
                }
                File::Dense(dense) => {
                    for element in dense.sorted_from(KEY_MIN) {
                        self.push_pruned(element.clone(), active);
                    }
                }
            }
        }
    }

    fn push_pruned(&mut self, mut element: Element, active: &TransactionSequence) {
        let (head, _) = prune(element.version.as_ref(), active);
        element.version = head;
        if element.tombstone && element.version.is_none() {
            // Fully collected: no reader can still need this slot.
            return;
        }
        self.elements.push(element);
    }

    /// Number of collected elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Takes the collected elements, sorted ascending by key.
    pub fn take(&mut self) -> Vec<Element> {
        std::mem::take(&mut self.elements)
    }
}
