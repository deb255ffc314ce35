//! Rebalance triggers and decisions.

use crate::memstore::segment::SegmentCaps;
use crate::memstore::Leaf;

/// What to do with a latched, measured leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RebalanceDecision {
    /// Redistribute in place across the leaf's segments.
    Spread,
    /// Replace the leaf by two.
    Split,
}

/// Total element capacity of one leaf.
pub(crate) fn leaf_capacity(caps: &SegmentCaps, num_segments: usize) -> usize {
    caps.capacity * num_segments
}

/// Whether any segment of the leaf crossed the spread trigger. Readable
/// without latches; a rebalance that finds the condition gone returns
/// without work.
pub(crate) fn needs_spread(leaf: &Leaf, caps: &SegmentCaps) -> bool {
    leaf.segments()
        .iter()
        .any(|segment| segment.fill() >= caps.high_watermark)
}

/// Decides between spreading in place and splitting, given the number of
/// surviving elements. A spread keeps headroom so the next writer does not
/// immediately overflow again.
pub(crate) fn decide(total: usize, leaf_capacity: usize) -> RebalanceDecision {
    if total <= leaf_capacity * 3 / 4 {
        RebalanceDecision::Spread
    } else {
        RebalanceDecision::Split
    }
}

/// Whether two adjacent leaves are jointly underfilled enough to merge.
pub(crate) fn merge_candidate(left_fill: usize, right_fill: usize, leaf_capacity: usize) -> bool {
    left_fill + right_fill <= leaf_capacity / 2
}
