//! The storage tree: vertex and edge operations over trie-indexed leaves.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::Config;
use crate::context::global::GlobalContext;
use crate::context::property::GraphProperty;
use crate::error::{EntityFault, GraphError, Result};
use crate::rebalance::{self, MergerService};
use crate::transaction::{TransactionImpl, Undo};

use super::context::{self, SegmentRef};
use super::cursor::CursorState;
use super::error::{MemError, MemResult};
use super::index::Index;
use super::key::{Key, KEY_MAX, KEY_MIN};
use super::leaf::Leaf;
use super::segment::{resolve_element, File, SegmentCaps};
use super::update::Update;

/// Optimistic attempts before a point read escalates to an exact reader.
const OPTIMISTIC_ATTEMPTS: usize = 4;

/// The tree of leaves plus the maintenance services attached to it.
pub struct Memstore {
    global: Weak<GlobalContext>,
    index: Index,
    directed: bool,
    caps: SegmentCaps,
    leaf_segments: usize,
    merger: Mutex<Option<MergerService>>,
}

impl Memstore {
    /// Creates an empty store with a single leaf covering the key universe.
    pub fn new(global: Weak<GlobalContext>, config: &Config) -> Self {
        let first = Arc::new(Leaf::new(config.leaf_num_segments, KEY_MIN, KEY_MAX));
        Self {
            global,
            index: Index::new(first),
            directed: config.directed,
            caps: SegmentCaps::from_config(config),
            leaf_segments: config.leaf_num_segments,
            merger: Mutex::new(None),
        }
    }

    /// Whether edge updates follow directed-graph semantics.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub(crate) fn index(&self) -> &Index {
        &self.index
    }

    pub(crate) fn caps(&self) -> &SegmentCaps {
        &self.caps
    }

    pub(crate) fn leaf_segments(&self) -> usize {
        self.leaf_segments
    }

    pub(crate) fn global(&self) -> Option<Arc<GlobalContext>> {
        self.global.upgrade()
    }

    /// Starts the background merger service.
    pub fn start_merger(self: &Arc<Self>, global: &Arc<GlobalContext>) {
        let interval = std::time::Duration::from_millis(global.config().merger_interval_ms);
        let service = MergerService::start(Arc::downgrade(self), Arc::downgrade(global), interval);
        *self.merger.lock() = Some(service);
    }

    /// Stops the background merger service.
    pub fn stop_merger(&self) {
        if let Some(service) = self.merger.lock().take() {
            service.stop();
        }
    }

    /// Drops every leaf. Part of the engine shutdown.
    pub fn clear(&self) {
        self.index.clear();
    }

    // ------------------------------------------------------------------
    // Vertices
    // ------------------------------------------------------------------

    /// Inserts the vertex `v`.
    pub fn insert_vertex(&self, tx: &Arc<TransactionImpl>, v: u64) -> Result<()> {
        check_vertex_id(v)?;
        let _epoch = tx.thread_context().epoch_guard();
        self.write(tx, Update::insert_vertex(v), true)?;
        tx.record_local_change(GraphProperty {
            vertex_count: 1,
            edge_count: 0,
        });
        trace!(v, "vertex inserted");
        Ok(())
    }

    /// Whether the vertex `v` exists in the transaction's snapshot.
    pub fn has_vertex(&self, tx: &Arc<TransactionImpl>, v: u64) -> Result<bool> {
        check_vertex_id(v)?;
        let _epoch = tx.thread_context().epoch_guard();
        Ok(self.point_lookup(tx, Key::vertex(v))?.is_some())
    }

    /// Removes the vertex `v` and all of its attached edges, returning the
    /// outgoing degree it had.
    pub fn remove_vertex(&self, tx: &Arc<TransactionImpl>, v: u64) -> Result<u64> {
        check_vertex_id(v)?;
        let _epoch = tx.thread_context().epoch_guard();

        if self.point_lookup(tx, Key::vertex(v))?.is_none() {
            return Err(GraphError::Vertex {
                vertex: v,
                fault: EntityFault::DoesNotExist,
            });
        }

        let mut destinations = Vec::new();
        self.scan(tx, Key::new(v, 1), None, &mut |key: Key, _weight| {
            if key.source() != v {
                return false;
            }
            destinations.push(key.destination());
            true
        })?;

        let mut mutated = false;
        let fail = |tx: &Arc<TransactionImpl>, mutated: bool, err: MemError| -> GraphError {
            if mutated {
                tx.set_error();
            }
            err.into()
        };

        for &destination in &destinations {
            self.write(tx, Update::remove_edge(v, destination), true)
                .map_err(|err| fail(tx, mutated, err))?;
            mutated = true;
            if !self.directed {
                self.write(tx, Update::remove_edge(destination, v), true)
                    .map_err(|err| fail(tx, mutated, err))?;
            }
        }
        self.write(tx, Update::remove_vertex(v), true)
            .map_err(|err| fail(tx, mutated, err))?;

        tx.record_local_change(GraphProperty {
            vertex_count: -1,
            edge_count: -(destinations.len() as i64),
        });
        debug!(v, degree = destinations.len(), "vertex removed");
        Ok(destinations.len() as u64)
    }

    /// The outgoing degree of `v` in the transaction's snapshot.
    pub fn get_degree(&self, tx: &Arc<TransactionImpl>, v: u64) -> Result<u64> {
        check_vertex_id(v)?;
        let _epoch = tx.thread_context().epoch_guard();
        if self.point_lookup(tx, Key::vertex(v))?.is_none() {
            return Err(GraphError::Vertex {
                vertex: v,
                fault: EntityFault::DoesNotExist,
            });
        }
        let mut degree = 0u64;
        self.scan(tx, Key::new(v, 1), None, &mut |key: Key, _weight| {
            if key.source() != v {
                return false;
            }
            degree += 1;
            true
        })?;
        Ok(degree)
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Inserts the edge `source -> destination`. In undirected mode the
    /// mirrored entry is materialised in the same transaction.
    pub fn insert_edge(
        &self,
        tx: &Arc<TransactionImpl>,
        source: u64,
        destination: u64,
        weight: f64,
    ) -> Result<()> {
        check_edge_ids(source, destination)?;
        let _epoch = tx.thread_context().epoch_guard();

        if self.point_lookup(tx, Key::vertex(destination))?.is_none() {
            return Err(GraphError::Vertex {
                vertex: destination,
                fault: EntityFault::DoesNotExist,
            });
        }

        self.write(tx, Update::insert_edge(source, destination, weight), false)?;
        if !self.directed {
            // The mirror's source is the destination vertex, checked above.
            self.write(tx, Update::insert_edge(destination, source, weight), true)
                .map_err(|err| {
                    tx.set_error();
                    GraphError::from(err)
                })?;
        }
        tx.record_local_change(GraphProperty {
            vertex_count: 0,
            edge_count: 1,
        });
        trace!(source, destination, weight, "edge inserted");
        Ok(())
    }

    /// Removes the edge `source -> destination` (and its mirror in
    /// undirected mode).
    pub fn remove_edge(&self, tx: &Arc<TransactionImpl>, source: u64, destination: u64) -> Result<()> {
        check_edge_ids(source, destination)?;
        let _epoch = tx.thread_context().epoch_guard();

        self.write(tx, Update::remove_edge(source, destination), true)?;
        if !self.directed {
            self.write(tx, Update::remove_edge(destination, source), true)
                .map_err(|err| {
                    tx.set_error();
                    GraphError::from(err)
                })?;
        }
        tx.record_local_change(GraphProperty {
            vertex_count: 0,
            edge_count: -1,
        });
        trace!(source, destination, "edge removed");
        Ok(())
    }

    /// Whether the edge exists in the transaction's snapshot.
    pub fn has_edge(&self, tx: &Arc<TransactionImpl>, source: u64, destination: u64) -> Result<bool> {
        check_edge_ids(source, destination)?;
        let _epoch = tx.thread_context().epoch_guard();
        Ok(self.point_lookup(tx, Key::new(source, destination))?.is_some())
    }

    /// The weight of the edge, or an error when it does not exist.
    pub fn get_weight(&self, tx: &Arc<TransactionImpl>, source: u64, destination: u64) -> Result<f64> {
        check_edge_ids(source, destination)?;
        let _epoch = tx.thread_context().epoch_guard();
        self.point_lookup(tx, Key::new(source, destination))?
            .ok_or(GraphError::Edge {
                src: source,
                destination,
                fault: EntityFault::DoesNotExist,
            })
    }

    // ------------------------------------------------------------------
    // Scans
    // ------------------------------------------------------------------

    /// Visits every element with key >= `from`, in key order, resolving
    /// MVCC visibility for `tx`. The callback returns `false` to stop; when
    /// a cursor is supplied the stop position (and its reader latch) is
    /// saved into it for a cheap resume.
    pub(crate) fn scan<F>(
        &self,
        tx: &Arc<TransactionImpl>,
        from: Key,
        mut cursor: Option<&mut CursorState>,
        f: &mut F,
    ) -> MemResult<()>
    where
        F: FnMut(Key, f64) -> bool,
    {
        let mut key = from;
        let mut resumed = match cursor.as_deref_mut() {
            Some(state) => state.try_resume(from),
            None => None,
        };

        loop {
            let (leaf, segment_id, start) = match resumed.take() {
                Some(position) => (position.leaf, position.segment_id, Some(position.pos)),
                None => {
                    let SegmentRef { leaf, segment_id } = context::reader_enter(&self.index, key)?;
                    (leaf, segment_id, None)
                }
            };
            let segment = leaf.segment(segment_id);
            let body = segment.body.read();
            if !body.covers(key) {
                // A stale resume; restart from the index.
                drop(body);
                segment.latch().reader_exit();
                continue;
            }
            let next_key = body.fence_hi;

            if let File::Sparse(_) = body.file {
                // Stop position within the sparse file, when the callback
                // asked to stop.
                let stopped = {
                    let File::Sparse(sparse) = &body.file else {
                        unreachable!()
                    };
                    let mut pos = match start {
                        Some(pos) => pos,
                        None => match sparse.search(key) {
                            Ok(pos) | Err(pos) => pos,
                        },
                    };
                    let mut stopped = None;
                    while pos < sparse.len() {
                        let element = sparse.get(pos);
                        if element.key >= key {
                            if let Some(weight) = resolve_element(tx, element) {
                                if !f(element.key, weight) {
                                    stopped = Some((element.key, pos));
                                    break;
                                }
                            }
                        }
                        pos += 1;
                    }
                    stopped
                };
                drop(body);
                if let Some((stop_key, pos)) = stopped {
                    match cursor.as_deref_mut() {
                        Some(state) => {
                            // The reader latch transfers into the cursor.
                            let version = segment.latch().version();
                            state.save(leaf.clone(), segment_id, stop_key, pos, version);
                        }
                        None => segment.latch().reader_exit(),
                    }
                    return Ok(());
                }
            } else {
                // Dense layouts are not position addressable; resolve into a
                // scratch list, then release before calling out.
                let resolved: SmallVec<[(Key, f64); 16]> = {
                    let File::Dense(dense) = &body.file else {
                        unreachable!()
                    };
                    dense
                        .sorted_from(key)
                        .into_iter()
                        .filter_map(|element| {
                            resolve_element(tx, element).map(|weight| (element.key, weight))
                        })
                        .collect()
                };
                drop(body);
                for (element_key, weight) in resolved {
                    if !f(element_key, weight) {
                        segment.latch().reader_exit();
                        return Ok(());
                    }
                }
            }

            segment.latch().reader_exit();
            if next_key == KEY_MAX {
                return Ok(());
            }
            key = next_key;
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Resolved point lookup: `Some(weight)` when the slot holds a record
    /// visible to `tx`. Optimistic with an exact-reader escalation.
    fn point_lookup(&self, tx: &Arc<TransactionImpl>, key: Key) -> MemResult<Option<f64>> {
        for _ in 0..OPTIMISTIC_ATTEMPTS {
            let (sref, version) = match context::optimistic_enter(&self.index, key) {
                Ok(entered) => entered,
                Err(MemError::Abort) => {
                    std::hint::spin_loop();
                    continue;
                }
                Err(other) => return Err(other),
            };
            let segment = sref.segment();
            let Some(body) = segment.body.try_read() else {
                continue;
            };
            if !body.covers(key) {
                continue;
            }
            let result = body.file.find(key).and_then(|element| resolve_element(tx, element));
            drop(body);
            if segment.latch().optimistic_validate(version).is_ok() {
                return Ok(result);
            }
        }

        let sref = context::reader_enter(&self.index, key)?;
        let segment = sref.segment();
        let body = segment.body.read();
        let result = body.file.find(key).and_then(|element| resolve_element(tx, element));
        drop(body);
        segment.latch().reader_exit();
        Ok(result)
    }

    /// Applies one update, translating capacity overflows into rebalances
    /// and unresolved source-vertex checks into predecessor lookups.
    fn write(&self, tx: &Arc<TransactionImpl>, update: Update, mut has_source: bool) -> MemResult<()> {
        let key = update.key();
        loop {
            let sref = context::writer_enter(&self.index, key);
            let segment = sref.segment();
            let outcome = segment.write(tx, update, has_source, &self.caps);
            match outcome {
                Ok(fill) => {
                    segment.latch().writer_exit();
                    if fill >= self.caps.high_watermark {
                        if let Some(global) = self.global() {
                            global.runtime().schedule_rebalance(key);
                        }
                    }
                    return Ok(());
                }
                Err(MemError::Capacity) => {
                    segment.latch().writer_exit();
                    debug!(%key, "segment full, rebalancing inline");
                    rebalance::rebalance_leaf(self, &sref.leaf, true);
                }
                Err(MemError::NotSureHasSource) => {
                    segment.latch().writer_exit();
                    let source = key.source();
                    match self.point_lookup(tx, Key::vertex(source))? {
                        Some(_) => has_source = true,
                        None => return Err(MemError::VertexDoesNotExist(source)),
                    }
                }
                Err(other) => {
                    segment.latch().writer_exit();
                    return Err(other);
                }
            }
        }
    }

    /// Reinstalls the pre-image carried by `undo` during a rollback,
    /// relinking the rest of the chain into the slot.
    pub fn do_rollback(&self, undo: &Arc<Undo>) {
        let update = *undo.payload();
        let next = undo.next();
        let sref = context::writer_enter(&self.index, update.key());
        sref.segment().apply_rollback(&update, next);
        sref.segment().latch().writer_exit();
    }
}

fn check_vertex_id(v: u64) -> Result<()> {
    if v == 0 {
        return Err(GraphError::logical("invalid vertex identifier 0"));
    }
    Ok(())
}

fn check_edge_ids(source: u64, destination: u64) -> Result<()> {
    if source == 0 || destination == 0 {
        return Err(GraphError::logical("invalid vertex identifier 0"));
    }
    if source == destination {
        return Err(GraphError::Edge {
            src: source,
            destination,
            fault: EntityFault::SelfEdge,
        });
    }
    Ok(())
}
