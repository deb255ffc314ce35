//! Saved reader positions.
//!
//! An exact reader may save its position instead of releasing its latch, so
//! a subsequent scan continuing at a nearby key resumes without an index
//! walk. The saved state retains the segment's *reader latch*; whoever
//! holds a `CursorState` therefore blocks writers and rebalancers on that
//! segment until the cursor is closed. Only sparse files are position
//! addressable; scans over dense segments never save.

use std::sync::Arc;

use super::key::Key;
use super::leaf::Leaf;

/// A saved position: leaf, segment, the next key to read, the logical
/// position inside the sparse file and the latch version at save time.
pub(crate) struct CursorPosition {
    pub leaf: Arc<Leaf>,
    pub segment_id: usize,
    pub key: Key,
    pub pos: usize,
    pub version: u64,
}

/// The saved state of a cursor. While valid it holds a reader latch on the
/// saved segment.
#[derive(Default)]
pub struct CursorState {
    position: Option<CursorPosition>,
}

impl CursorState {
    /// A new, invalid cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cursor holds a saved position (and its latch).
    pub fn is_valid(&self) -> bool {
        self.position.is_some()
    }

    /// The next key the cursor would read, when valid.
    pub fn key(&self) -> Option<Key> {
        self.position.as_ref().map(|position| position.key)
    }

    /// Saves a position. The caller transfers ownership of the reader latch
    /// it holds on `leaf[segment_id]` to the cursor.
    pub(crate) fn save(
        &mut self,
        leaf: Arc<Leaf>,
        segment_id: usize,
        key: Key,
        pos: usize,
        version: u64,
    ) {
        debug_assert!(
            self.position.is_none(),
            "saving over a held position would leak a latch"
        );
        self.position = Some(CursorPosition {
            leaf,
            segment_id,
            key,
            pos,
            version,
        });
    }

    /// Attempts to resume at `from`. On success the saved position (and the
    /// latch ownership) transfer back to the caller; otherwise the cursor is
    /// closed and the caller must restart from the index.
    pub(crate) fn try_resume(&mut self, from: Key) -> Option<CursorPosition> {
        {
            let position = self.position.as_ref()?;
            if from < position.key {
                // Backwards jumps restart from the index.
                self.close();
                return None;
            }
            let segment = position.leaf.segment(position.segment_id);
            if segment.latch().version() != position.version {
                self.close();
                return None;
            }
            let body = segment.body.read();
            if from >= body.fence_hi {
                drop(body);
                self.close();
                return None;
            }
        }
        self.position.take()
    }

    /// Releases the held latch and invalidates the state.
    pub fn close(&mut self) {
        if let Some(position) = self.position.take() {
            position.leaf.segment(position.segment_id).latch().reader_exit();
        }
    }
}

impl Drop for CursorState {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.position {
            None => write!(f, "CursorState(closed)"),
            Some(position) => write!(
                f,
                "CursorState(leaf: {}, segment: {}, key: {}, pos: {})",
                position.leaf.leaf_id(),
                position.segment_id,
                position.key,
                position.pos
            ),
        }
    }
}
