//! Traversal bookkeeping: locating and latching the segment a key routes
//! to, re-walking the index whenever a rebalance superseded the path.

use std::sync::Arc;

use super::error::{MemError, MemResult};
use super::index::Index;
use super::key::Key;
use super::leaf::Leaf;
use super::segment::Segment;

/// A latched position inside the tree: the visited leaf and segment.
pub(crate) struct SegmentRef {
    pub leaf: Arc<Leaf>,
    pub segment_id: usize,
}

impl SegmentRef {
    pub fn segment(&self) -> &Segment {
        self.leaf.segment(self.segment_id)
    }
}

/// Routes `key` through the index and acquires the writer latch on its
/// segment, re-walking on invalidation and on fence movement.
pub(crate) fn writer_enter(index: &Index, key: Key) -> SegmentRef {
    loop {
        let leaf = index.find(key);
        let segment_id = leaf.find_segment(key);
        let segment = leaf.segment(segment_id);
        match segment.latch().writer_enter() {
            Err(MemError::Invalid) => continue,
            Err(other) => unreachable!("writer acquisition cannot fail with {other:?}"),
            Ok(()) => {}
        }
        // Fences may have moved between the index walk and the latch
        // acquisition; they cannot move anymore while the latch is held.
        if segment.body.read().covers(key) {
            return SegmentRef { leaf, segment_id };
        }
        segment.latch().writer_exit();
    }
}

/// Routes `key` and acquires the reader latch on its segment.
pub(crate) fn reader_enter(index: &Index, key: Key) -> MemResult<SegmentRef> {
    loop {
        let leaf = index.find(key);
        let segment_id = leaf.find_segment(key);
        let segment = leaf.segment(segment_id);
        match segment.latch().reader_enter() {
            Err(MemError::Invalid) => continue,
            Err(other) => return Err(other),
            Ok(()) => {}
        }
        if segment.body.read().covers(key) {
            return Ok(SegmentRef { leaf, segment_id });
        }
        segment.latch().reader_exit();
    }
}

/// Routes `key` and begins an optimistic read on its segment, returning the
/// captured version. Fails with `Abort` when an exclusive holder is active;
/// invalidated paths are re-walked internally.
pub(crate) fn optimistic_enter(index: &Index, key: Key) -> MemResult<(SegmentRef, u64)> {
    loop {
        let leaf = index.find(key);
        let segment_id = leaf.find_segment(key);
        let segment = leaf.segment(segment_id);
        match segment.latch().optimistic_begin() {
            Err(MemError::Invalid) => continue,
            Err(other) => return Err(other),
            Ok(version) => return Ok((SegmentRef { leaf, segment_id }, version)),
        }
    }
}
