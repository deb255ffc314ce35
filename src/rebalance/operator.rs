//! Spread and split over a latched leaf.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::memstore::key::Key;
use crate::memstore::leaf::{fence_lows, partition};
use crate::memstore::segment::Element;
use crate::memstore::sparse_file::SparseFile;
use crate::memstore::{File, Leaf, MemError, Memstore};

use super::plan::{self, RebalanceDecision};
use super::scratchpad::ScratchPad;

/// What a rebalance attempt did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Nothing to do: the trigger condition had already cleared.
    Balanced,
    /// Elements were redistributed across the leaf's segments.
    Spread,
    /// The leaf was replaced by two.
    Split,
    /// The leaf was gone or contended; the request is dropped (rebalances
    /// are idempotent, a later trigger will retry).
    Skipped,
}

/// Rebalances one leaf.
///
/// Rebalancer latches are acquired over the whole leaf in fixed
/// left-to-right order. A `forced` rebalance (a writer that hit a full
/// segment) blocks until it gets them; a maintenance rebalance gives up on
/// contention instead, so background threads can always be stopped.
pub fn rebalance_leaf(memstore: &Memstore, leaf: &Arc<Leaf>, forced: bool) -> RebalanceOutcome {
    let num_segments = leaf.num_segments();
    let mut held = 0;
    while held < num_segments {
        let latch = leaf.segment(held).latch();
        let acquired = if forced {
            latch.rebalancer_enter().map(|_| true)
        } else {
            latch.rebalancer_try_enter()
        };
        match acquired {
            Ok(true) => held += 1,
            Ok(false) | Err(MemError::Invalid) => {
                release(leaf, held);
                return RebalanceOutcome::Skipped;
            }
            Err(other) => unreachable!("rebalancer acquisition cannot fail with {other:?}"),
        }
    }

    if !forced && !plan::needs_spread(leaf, memstore.caps()) {
        release(leaf, num_segments);
        return RebalanceOutcome::Balanced;
    }

    let Some(global) = memstore.global() else {
        release(leaf, num_segments);
        return RebalanceOutcome::Skipped;
    };
    let active = global.active_transactions();

    let mut scratch = ScratchPad::new();
    scratch.collect_leaf(leaf, &active);
    let total = scratch.len();
    let capacity = plan::leaf_capacity(memstore.caps(), num_segments);

    match plan::decide(total, capacity) {
        RebalanceDecision::Spread => {
            spread_in_place(leaf, scratch.take());
            release(leaf, num_segments);
            trace!(leaf = leaf.leaf_id(), total, "leaf spread");
            RebalanceOutcome::Spread
        }
        RebalanceDecision::Split => {
            let elements = scratch.take();
            let middle = elements.len() / 2;
            let middle_key = elements[middle].key;
            let lo = leaf.lo();
            let hi = leaf.hi();

            let left = Leaf::build(num_segments, lo, middle_key, elements[..middle].to_vec());
            let right = Leaf::build(num_segments, middle_key, hi, elements[middle..].to_vec());

            // Terminal state first: any latecomer parked on these latches
            // wakes to `Invalid` and re-walks the index.
            leaf.mark_all_invalid();
            memstore.index().replace(&[lo], vec![left, right]);
            release(leaf, num_segments);

            let stale = Arc::clone(leaf);
            global.gc().mark(Box::new(move || drop(stale)));
            debug!(leaf = leaf.leaf_id(), total, %middle_key, "leaf split");
            RebalanceOutcome::Split
        }
    }
}

/// Merges two adjacent, jointly underfilled leaves into a replacement.
/// Latch order is left leaf then right leaf, each left-to-right; always
/// non-blocking, since only maintenance threads merge.
pub(crate) fn merge_pair(memstore: &Memstore, left: &Arc<Leaf>, right: &Arc<Leaf>) -> bool {
    let mut held_left = 0;
    let mut held_right = 0;
    let bail = |l: usize, r: usize| {
        release(right, r);
        release(left, l);
        false
    };

    while held_left < left.num_segments() {
        match left.segment(held_left).latch().rebalancer_try_enter() {
            Ok(true) => held_left += 1,
            _ => return bail(held_left, 0),
        }
    }
    while held_right < right.num_segments() {
        match right.segment(held_right).latch().rebalancer_try_enter() {
            Ok(true) => held_right += 1,
            _ => return bail(held_left, held_right),
        }
    }

    // The pair was selected without latches; re-check adjacency now that
    // both are pinned.
    if left.hi() != right.lo() {
        return bail(held_left, held_right);
    }
    let Some(global) = memstore.global() else {
        return bail(held_left, held_right);
    };
    let active = global.active_transactions();

    let mut scratch = ScratchPad::new();
    scratch.collect_leaf(left, &active);
    scratch.collect_leaf(right, &active);
    let capacity = plan::leaf_capacity(memstore.caps(), memstore.leaf_segments());
    if scratch.len() > capacity * 3 / 4 {
        return bail(held_left, held_right);
    }

    let merged = Leaf::build(
        memstore.leaf_segments(),
        left.lo(),
        right.hi(),
        scratch.take(),
    );
    left.mark_all_invalid();
    right.mark_all_invalid();
    memstore.index().replace(&[left.lo(), right.lo()], vec![merged]);
    release(left, held_left);
    release(right, held_right);

    let stale_left = Arc::clone(left);
    let stale_right = Arc::clone(right);
    global.gc().mark(Box::new(move || drop(stale_left)));
    global.gc().mark(Box::new(move || drop(stale_right)));
    debug!(
        left = left.leaf_id(),
        right = right.leaf_id(),
        "leaves merged"
    );
    true
}

fn spread_in_place(leaf: &Leaf, elements: Vec<Element>) {
    let num_segments = leaf.num_segments();
    let lo = leaf.lo();
    let hi = leaf.hi();
    let chunks = partition(elements, num_segments);
    let lows = fence_lows(lo, hi, &chunks);

    for (index, chunk) in chunks.into_iter().enumerate() {
        let segment = leaf.segment(index);
        let fill = chunk.len();
        let mut body = segment.body.write();
        body.fence_lo = lows[index];
        body.fence_hi = lows.get(index + 1).copied().unwrap_or(hi);
        body.file = File::Sparse(SparseFile::from_sorted(chunk));
        drop(body);
        segment.set_fill(fill);
    }
    leaf.set_fences(lows, hi);
}

fn release(leaf: &Leaf, held: usize) {
    for index in 0..held {
        leaf.segment(index).latch().rebalancer_exit();
    }
}

/// Entry point for the worker pool's rebalance task.
pub fn handle_rebalance(memstore: &Memstore, key: Key) {
    let leaf = memstore.index().find(key);
    let outcome = rebalance_leaf(memstore, &leaf, false);
    trace!(%key, ?outcome, "scheduled rebalance handled");
}
