//! The user-facing transaction handle.

use std::sync::Arc;

use crate::context::global::GlobalContext;
use crate::error::{GraphError, Result};
use crate::memstore::Key;
use crate::transaction::TransactionImpl;

use super::iterator::EdgeIterator;

/// A user handle to a transaction.
///
/// Handles are reference counted: cloning shares the same transaction, and
/// the transaction is rolled back automatically when the last handle drops
/// without an explicit commit or rollback.
pub struct Transaction {
    inner: Arc<TransactionImpl>,
    global: Arc<GlobalContext>,
}

impl Transaction {
    pub(crate) fn new(inner: Arc<TransactionImpl>, global: Arc<GlobalContext>) -> Transaction {
        inner.incr_user_count();
        Transaction { inner, global }
    }

    pub(crate) fn inner(&self) -> &Arc<TransactionImpl> {
        &self.inner
    }

    pub(crate) fn global(&self) -> &Arc<GlobalContext> {
        &self.global
    }

    /// Whether the transaction was started read-only.
    pub fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    /// The transaction's read timestamp: its start time while pending, its
    /// commit time afterwards.
    pub fn ts_read(&self) -> u64 {
        self.inner.ts_read()
    }

    fn check_active(&self) -> Result<()> {
        if self.inner.is_terminated() {
            return Err(GraphError::logical("This transaction is already terminated"));
        }
        if self.inner.is_error() {
            return Err(GraphError::logical(
                "The transaction must be rolled back as it is in an error state",
            ));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_active()?;
        if self.inner.is_read_only() {
            return Err(GraphError::logical(
                "the transaction is read-only",
            ));
        }
        Ok(())
    }

    /// Inserts the vertex `v`.
    pub fn insert_vertex(&self, v: u64) -> Result<()> {
        self.check_writable()?;
        self.global.memstore().insert_vertex(&self.inner, v)
    }

    /// Removes the vertex `v` and all of its attached edges, returning its
    /// outgoing degree.
    pub fn remove_vertex(&self, v: u64) -> Result<u64> {
        self.check_writable()?;
        self.global.memstore().remove_vertex(&self.inner, v)
    }

    /// Whether the vertex `v` exists in this transaction's snapshot.
    pub fn has_vertex(&self, v: u64) -> Result<bool> {
        self.check_active()?;
        self.global.memstore().has_vertex(&self.inner, v)
    }

    /// The outgoing degree of `v`.
    pub fn get_degree(&self, v: u64) -> Result<u64> {
        self.check_active()?;
        self.global.memstore().get_degree(&self.inner, v)
    }

    /// Inserts the edge `source -> destination` with the given weight.
    pub fn insert_edge(&self, source: u64, destination: u64, weight: f64) -> Result<()> {
        self.check_writable()?;
        self.global
            .memstore()
            .insert_edge(&self.inner, source, destination, weight)
    }

    /// Removes the edge `source -> destination`.
    pub fn remove_edge(&self, source: u64, destination: u64) -> Result<()> {
        self.check_writable()?;
        self.global.memstore().remove_edge(&self.inner, source, destination)
    }

    /// Whether the edge exists in this transaction's snapshot.
    pub fn has_edge(&self, source: u64, destination: u64) -> Result<bool> {
        self.check_active()?;
        self.global.memstore().has_edge(&self.inner, source, destination)
    }

    /// The weight of the edge, or an error when it does not exist.
    pub fn get_weight(&self, source: u64, destination: u64) -> Result<f64> {
        self.check_active()?;
        self.global.memstore().get_weight(&self.inner, source, destination)
    }

    /// Number of vertices visible to this transaction.
    pub fn num_vertices(&self) -> Result<u64> {
        self.check_active()?;
        Ok(self.inner.graph_properties()?.vertex_count.max(0) as u64)
    }

    /// Number of logical edges visible to this transaction.
    pub fn num_edges(&self) -> Result<u64> {
        self.check_active()?;
        Ok(self.inner.graph_properties()?.edge_count.max(0) as u64)
    }

    /// Visits the outgoing edges of `v` in destination order. The callback
    /// returns `false` to stop early.
    pub fn scan_out<F>(&self, v: u64, mut callback: F) -> Result<()>
    where
        F: FnMut(u64, f64) -> bool,
    {
        self.check_active()?;
        if v == 0 {
            return Err(GraphError::logical("invalid vertex identifier 0"));
        }
        let _epoch = self.inner.thread_context().epoch_guard();
        let mut wrapper = |key: Key, weight: f64| {
            if key.source() != v {
                return false;
            }
            callback(key.destination(), weight)
        };
        self.global
            .memstore()
            .scan(&self.inner, Key::new(v, 1), None, &mut wrapper)
            .map_err(Into::into)
    }

    /// Opens an iterator bound to this transaction. While any iterator is
    /// open the transaction cannot be terminated.
    pub fn iterator(&self) -> Result<EdgeIterator> {
        self.check_active()?;
        Ok(EdgeIterator::new(self.clone()))
    }

    /// Commits the transaction.
    pub fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    /// Rolls the transaction back, undoing all of its changes.
    pub fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        self.inner.incr_user_count();
        Transaction {
            inner: Arc::clone(&self.inner),
            global: Arc::clone(&self.global),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.inner.decr_user_count();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}
