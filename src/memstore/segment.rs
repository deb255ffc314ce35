//! The segment: the unit of latching and physical storage.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::config::Config;
use crate::transaction::{resolve, TransactionImpl, Undo, Visibility};

use super::dense_file::DenseFile;
use super::error::{MemError, MemResult};
use super::key::Key;
use super::latch::SegmentLatch;
use super::sparse_file::SparseFile;
use super::update::{EntryKind, OpKind, Update};

/// A stored record plus its MVCC side-channel.
#[derive(Clone)]
pub struct Element {
    /// The slot's key.
    pub key: Key,
    /// Edge weight; zero for vertex records.
    pub weight: f64,
    /// Logically removed; awaiting collection by the next rebalance.
    pub tombstone: bool,
    /// Head of the version chain, or `None` when no in-flight or recent
    /// change exists.
    pub version: Option<Arc<Undo>>,
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("key", &self.key)
            .field("weight", &self.weight)
            .field("tombstone", &self.tombstone)
            .field("versioned", &self.version.is_some())
            .finish()
    }
}

/// Physical layout of a segment.
pub enum File {
    /// Ordered two-sided run.
    Sparse(SparseFile),
    /// Hash layout for churn-heavy segments.
    Dense(DenseFile),
}

impl File {
    /// Number of stored elements (live and tombstoned).
    pub fn len(&self) -> usize {
        match self {
            File::Sparse(file) => file.len(),
            File::Dense(file) => file.len(),
        }
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point lookup.
    pub fn find(&self, key: Key) -> Option<&Element> {
        match self {
            File::Sparse(file) => file.search(key).ok().map(|pos| file.get(pos)),
            File::Dense(file) => file.find(key),
        }
    }

    /// Mutable point lookup.
    pub fn find_mut(&mut self, key: Key) -> Option<&mut Element> {
        match self {
            File::Sparse(file) => match file.search(key) {
                Ok(pos) => Some(file.get_mut(pos)),
                Err(_) => None,
            },
            File::Dense(file) => file.find_mut(key),
        }
    }

    /// Consumes the layout into elements sorted ascending by key.
    pub fn into_sorted(self) -> Vec<Element> {
        match self {
            File::Sparse(file) => file.into_sorted(),
            File::Dense(file) => file.into_sorted(),
        }
    }

    /// Whether the layout is dense.
    pub fn is_dense(&self) -> bool {
        matches!(self, File::Dense(_))
    }
}

/// Segment payload: the fence keys and the physical layout.
pub struct SegmentBody {
    /// Inclusive lower fence.
    pub fence_lo: Key,
    /// Exclusive upper fence; equals the next segment's lower fence.
    pub fence_hi: Key,
    /// The stored elements.
    pub file: File,
}

impl SegmentBody {
    /// Whether `key` routes to this segment.
    pub fn covers(&self, key: Key) -> bool {
        self.fence_lo <= key && key < self.fence_hi
    }
}

/// Capacity knobs derived from the configuration once, at store creation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SegmentCaps {
    pub capacity: usize,
    pub dense_shift_threshold: usize,
    pub high_watermark: usize,
}

impl SegmentCaps {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.segment_capacity_elements(),
            dense_shift_threshold: config.dense_shift_threshold,
            high_watermark: config.segment_high_watermark(),
        }
    }
}

/// The unit of latching and physical storage inside a leaf.
pub struct Segment {
    pub(crate) latch: SegmentLatch,
    /// Fill level mirror, readable without the latch; used by rebalance
    /// triggers and the merger's underfill estimate.
    pub(crate) used: AtomicU32,
    pub(crate) body: RwLock<SegmentBody>,
}

impl Segment {
    /// A segment covering `[fence_lo, fence_hi)` with an empty sparse file.
    pub fn new(fence_lo: Key, fence_hi: Key) -> Self {
        Self {
            latch: SegmentLatch::new(),
            used: AtomicU32::new(0),
            body: RwLock::new(SegmentBody {
                fence_lo,
                fence_hi,
                file: File::Sparse(SparseFile::new()),
            }),
        }
    }

    /// The segment latch.
    pub fn latch(&self) -> &SegmentLatch {
        &self.latch
    }

    /// Approximate fill level, readable without the latch.
    pub fn fill(&self) -> usize {
        self.used.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn set_fill(&self, fill: usize) {
        self.used.store(fill as u32, Ordering::Relaxed);
    }

    /// Applies an update under the already-acquired writer latch.
    ///
    /// Returns the fill level after the write, so the caller can decide to
    /// schedule a spread.
    pub(crate) fn write(
        &self,
        tx: &Arc<TransactionImpl>,
        update: Update,
        has_source: bool,
        caps: &SegmentCaps,
    ) -> MemResult<usize> {
        let mut body = self.body.write();
        let key = update.key();
        debug_assert!(body.covers(key), "writer routed to the wrong segment");

        // An edge insert must prove its source vertex exists. The vertex
        // record sorts before all of its edges; when it is outside this
        // segment's fences the caller has to check the predecessor segment.
        if update.is_edge() && update.is_insert() && !has_source {
            let source_key = Key::vertex(key.source());
            if source_key < body.fence_lo {
                return Err(MemError::NotSureHasSource);
            }
            let present = body
                .file
                .find(source_key)
                .and_then(|element| resolve_element(tx, element))
                .is_some();
            if !present {
                return Err(MemError::VertexDoesNotExist(key.source()));
            }
        }

        let exists = body.file.find(key).is_some();
        if exists {
            let element = body.file.find_mut(key).expect("looked up above");
            let head = element.version.clone();
            if !tx.can_write(head.as_ref()) {
                return Err(MemError::Locked(key));
            }
            // `can_write` guarantees the live record is the state this
            // transaction observes.
            let current = (!element.tombstone).then_some(element.weight);
            match (update.op(), current) {
                (OpKind::Insert, Some(_)) => return Err(exists_fault(&update)),
                (OpKind::Remove, None) => return Err(absent_fault(&update)),
                _ => {}
            }
            let undo = tx.add_undo(update.pre_image(current), head);
            let element = body.file.find_mut(key).expect("looked up above");
            element.version = Some(undo);
            match update.op() {
                OpKind::Insert => {
                    element.tombstone = false;
                    element.weight = update.weight();
                }
                OpKind::Remove => element.tombstone = true,
            }
        } else {
            if update.is_remove() {
                return Err(absent_fault(&update));
            }
            if body.file.len() >= caps.capacity {
                return Err(MemError::Capacity);
            }
            let undo = tx.add_undo(update.pre_image(None), None);
            let element = Element {
                key,
                weight: update.weight(),
                tombstone: false,
                version: Some(undo),
            };
            let convert = match &body.file {
                File::Sparse(sparse) => {
                    let position = sparse
                        .search(key)
                        .expect_err("slot checked absent above");
                    sparse.shift_cost(position) > caps.dense_shift_threshold
                }
                File::Dense(_) => false,
            };
            if convert {
                let previous =
                    std::mem::replace(&mut body.file, File::Sparse(SparseFile::new()));
                let mut dense = DenseFile::from_elements(previous.into_sorted());
                dense.insert(element);
                body.file = File::Dense(dense);
            } else {
                match &mut body.file {
                    File::Sparse(sparse) => {
                        let position = sparse
                            .search(key)
                            .expect_err("slot checked absent above");
                        sparse.insert_at(position, element);
                    }
                    File::Dense(dense) => dense.insert(element),
                }
            }
        }

        let fill = body.file.len();
        self.set_fill(fill);
        Ok(fill)
    }

    /// Reinstalls a pre-image during rollback, under the writer latch.
    pub(crate) fn apply_rollback(&self, update: &Update, next: Option<Arc<Undo>>) {
        let mut body = self.body.write();
        match body.file.find_mut(update.key()) {
            Some(element) => {
                match update.op() {
                    OpKind::Insert => {
                        element.tombstone = false;
                        element.weight = update.weight();
                    }
                    OpKind::Remove => element.tombstone = true,
                }
                element.version = next;
            }
            None => warn!(key = %update.key(), "rollback target vanished from its segment"),
        }
    }
}

/// Resolves the state of an element as seen by `reader`: `Some(weight)` when
/// the slot holds a live record in the reader's snapshot, `None` when it is
/// absent.
pub(crate) fn resolve_element(reader: &TransactionImpl, element: &Element) -> Option<f64> {
    match &element.version {
        None => (!element.tombstone).then_some(element.weight),
        Some(head) => match resolve(reader, head) {
            Visibility::Live => (!element.tombstone).then_some(element.weight),
            Visibility::Pre(update) => update.is_insert().then(|| update.weight()),
        },
    }
}

fn exists_fault(update: &Update) -> MemError {
    match update.entry() {
        EntryKind::Vertex => MemError::VertexAlreadyExists(update.key().source()),
        EntryKind::Edge => MemError::EdgeAlreadyExists(update.key()),
    }
}

fn absent_fault(update: &Update) -> MemError {
    match update.entry() {
        EntryKind::Vertex => MemError::VertexDoesNotExist(update.key().source()),
        EntryKind::Edge => MemError::EdgeDoesNotExist(update.key()),
    }
}
