//! The edge iterator.

use crate::error::{GraphError, Result};
use crate::memstore::{CursorState, Key};

use super::transaction::Transaction;

/// Iterates the outgoing edges of one vertex at a time, keeping its reading
/// position between calls: a follow-up call for a nearby vertex resumes
/// from the saved cursor without walking the index again.
///
/// While an iterator is open its parent transaction cannot commit or roll
/// back.
pub struct EdgeIterator {
    tx: Transaction,
    cursor: CursorState,
}

impl EdgeIterator {
    pub(crate) fn new(tx: Transaction) -> EdgeIterator {
        tx.inner().iterator_opened();
        EdgeIterator {
            tx,
            cursor: CursorState::new(),
        }
    }

    /// Visits the outgoing edges of `vertex` in destination order; the
    /// callback receives `(destination, weight)` and returns `false` to
    /// stop early.
    ///
    /// `logical` selects the logical vertex-identifier space maintained by
    /// the external mapping service; only physical identifiers are
    /// supported here.
    pub fn edges<F>(&mut self, vertex: u64, logical: bool, mut callback: F) -> Result<()>
    where
        F: FnMut(u64, f64) -> bool,
    {
        if logical {
            return Err(GraphError::logical(
                "logical vertex identifiers require the external vertex mapping",
            ));
        }
        if vertex == 0 {
            return Err(GraphError::logical("invalid vertex identifier 0"));
        }
        if self.tx.inner().is_terminated() {
            return Err(GraphError::logical("This transaction is already terminated"));
        }

        let _epoch = self.tx.inner().thread_context().epoch_guard();
        let mut wrapper = |key: Key, weight: f64| {
            if key.source() != vertex {
                return false;
            }
            callback(key.destination(), weight)
        };
        self.tx
            .global()
            .memstore()
            .scan(
                self.tx.inner(),
                Key::new(vertex, 1),
                Some(&mut self.cursor),
                &mut wrapper,
            )
            .map_err(Into::into)
    }

    /// Whether the iterator still holds a saved position (and its latch).
    pub fn has_position(&self) -> bool {
        self.cursor.is_valid()
    }

    /// Releases the saved position and its latch.
    pub fn close(&mut self) {
        self.cursor.close();
    }
}

impl Drop for EdgeIterator {
    fn drop(&mut self) {
        self.cursor.close();
        self.tx.inner().iterator_closed();
    }
}
