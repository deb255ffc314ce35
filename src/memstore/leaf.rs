//! Leaves: fixed-capacity containers of segments.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::key::Key;
use super::segment::{Element, File, Segment};
use super::sparse_file::SparseFile;

static NEXT_LEAF_ID: AtomicU64 = AtomicU64::new(0);

/// Fence table of a leaf: the lower fence of each segment plus the leaf's
/// exclusive upper bound. Segment `i` covers `[lows[i], lows[i + 1])`, the
/// last one `[lows[n - 1], high)`.
pub struct LeafFences {
    /// Lower fences, ascending.
    pub lows: Vec<Key>,
    /// Exclusive upper bound of the whole leaf.
    pub high: Key,
}

/// A fixed array of segments with fence keys, owned by the index.
///
/// A leaf never changes identity: a split or merge builds replacement
/// leaves, marks every segment of the superseded ones invalid and hands
/// them to the epoch reclamation. Readers detect the terminal state through
/// the segment latches and restart from the index.
pub struct Leaf {
    leaf_id: u64,
    segments: Box<[Segment]>,
    fences: RwLock<LeafFences>,
}

impl Leaf {
    /// An empty leaf covering `[lo, hi)`: the first segment takes the whole
    /// range, the rest sit empty at the upper bound.
    pub fn new(num_segments: usize, lo: Key, hi: Key) -> Leaf {
        assert!(num_segments > 0);
        let mut segments = Vec::with_capacity(num_segments);
        let mut lows = Vec::with_capacity(num_segments);
        segments.push(Segment::new(lo, hi));
        lows.push(lo);
        for _ in 1..num_segments {
            segments.push(Segment::new(hi, hi));
            lows.push(hi);
        }
        Leaf {
            leaf_id: NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed),
            segments: segments.into_boxed_slice(),
            fences: RwLock::new(LeafFences { lows, high: hi }),
        }
    }

    /// Builds a leaf covering `[lo, hi)` from elements sorted ascending,
    /// distributed evenly across the segments as sparse files.
    pub fn build(num_segments: usize, lo: Key, hi: Key, elements: Vec<Element>) -> Arc<Leaf> {
        assert!(num_segments > 0);
        let chunks = partition(elements, num_segments);
        let lows = fence_lows(lo, hi, &chunks);

        let mut segments = Vec::with_capacity(num_segments);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let fence_hi = lows.get(index + 1).copied().unwrap_or(hi);
            let fill = chunk.len();
            let segment = Segment::new(lows[index], fence_hi);
            segment.body.write().file = File::Sparse(SparseFile::from_sorted(chunk));
            segment.set_fill(fill);
            segments.push(segment);
        }

        Arc::new(Leaf {
            leaf_id: NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed),
            segments: segments.into_boxed_slice(),
            fences: RwLock::new(LeafFences { lows, high: hi }),
        })
    }

    /// The leaf identifier, for diagnostics.
    pub fn leaf_id(&self) -> u64 {
        self.leaf_id
    }

    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// The segment at `index`.
    pub fn segment(&self, index: usize) -> &Segment {
        &self.segments[index]
    }

    /// All segments, in key order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The segment a key routes to, according to the fence table.
    pub fn find_segment(&self, key: Key) -> usize {
        let fences = self.fences.read();
        fences.lows.partition_point(|low| *low <= key).saturating_sub(1)
    }

    /// The inclusive lower bound of the leaf.
    pub fn lo(&self) -> Key {
        self.fences.read().lows[0]
    }

    /// The exclusive upper bound of the leaf.
    pub fn hi(&self) -> Key {
        self.fences.read().high
    }

    /// Replaces the fence table. Caller must hold every segment's
    /// rebalancer latch.
    pub fn set_fences(&self, lows: Vec<Key>, high: Key) {
        debug_assert_eq!(lows.len(), self.segments.len());
        let mut fences = self.fences.write();
        fences.lows = lows;
        fences.high = high;
    }

    /// Sum of the segments' fill mirrors; an estimate usable without
    /// latches.
    pub fn fill_estimate(&self) -> usize {
        self.segments.iter().map(|segment| segment.fill()).sum()
    }

    /// Marks every segment invalid. Caller must hold every segment's
    /// rebalancer latch.
    pub fn mark_all_invalid(&self) {
        for segment in self.segments.iter() {
            segment.latch.mark_invalid();
        }
    }
}

/// Splits sorted elements into `parts` chunks whose sizes differ by at most
/// one, earlier chunks taking the excess.
pub(crate) fn partition(mut elements: Vec<Element>, parts: usize) -> Vec<Vec<Element>> {
    let total = elements.len();
    let base = total / parts;
    let remainder = total % parts;
    let mut chunks: Vec<Vec<Element>> = Vec::with_capacity(parts);
    for index in (0..parts).rev() {
        let size = base + usize::from(index < remainder);
        chunks.push(elements.split_off(elements.len() - size));
    }
    chunks.reverse();
    chunks
}

/// The lower fence of each chunk: the covered range's start for the first,
/// the chunk's first key otherwise, and the upper bound for empty trailing
/// chunks.
pub(crate) fn fence_lows(lo: Key, hi: Key, chunks: &[Vec<Element>]) -> Vec<Key> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            if index == 0 {
                lo
            } else {
                chunk.first().map(|element| element.key).unwrap_or(hi)
            }
        })
        .collect()
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaf")
            .field("leaf_id", &self.leaf_id)
            .field("segments", &self.segments.len())
            .field("lo", &self.lo())
            .field("hi", &self.hi())
            .finish()
    }
}
