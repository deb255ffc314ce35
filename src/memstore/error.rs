//! Internal failure kinds of the storage layer.
//!
//! These are small, copyable values that drive retries inside the engine.
//! Only the terminal kinds (conflicts, semantic faults, reader overflow)
//! cross the public boundary, after translation into [`GraphError`].

use crate::error::{EntityFault, GraphError};

use super::key::Key;

/// Result alias for storage-internal operations.
pub type MemResult<T> = Result<T, MemError>;

/// Everything a storage operation can fail with before translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemError {
    /// An optimistic read observed an intervening writer; retry or escalate.
    Abort,
    /// The segment or leaf was superseded by a rebalance; re-walk the index.
    Invalid,
    /// The segment cannot accommodate the update; rebalance and retry.
    Capacity,
    /// The per-segment reader counter is saturated.
    TooManyReaders,
    /// An edge insert could not verify its source vertex locally; the caller
    /// must check the preceding segment and retry with the check disabled.
    NotSureHasSource,
    /// The slot is locked by another in-flight transaction.
    Locked(Key),
    /// The vertex already exists in the caller's snapshot.
    VertexAlreadyExists(u64),
    /// The vertex does not exist in the caller's snapshot.
    VertexDoesNotExist(u64),
    /// The edge already exists in the caller's snapshot.
    EdgeAlreadyExists(Key),
    /// The edge does not exist in the caller's snapshot.
    EdgeDoesNotExist(Key),
    /// Source and destination coincide.
    SelfEdge(Key),
}

impl MemError {
    /// Whether the condition is retryable inside the engine and must never
    /// reach the user.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            MemError::Abort | MemError::Invalid | MemError::Capacity | MemError::NotSureHasSource
        )
    }
}

impl From<MemError> for GraphError {
    fn from(err: MemError) -> Self {
        debug_assert!(!err.is_internal(), "internal condition escaped: {err:?}");
        match err {
            MemError::Locked(key) => GraphError::Conflict(format!(
                "the record {key} is locked by another transaction"
            )),
            MemError::TooManyReaders => GraphError::TooManyReaders,
            MemError::VertexAlreadyExists(v) => GraphError::Vertex {
                vertex: v,
                fault: EntityFault::AlreadyExists,
            },
            MemError::VertexDoesNotExist(v) => GraphError::Vertex {
                vertex: v,
                fault: EntityFault::DoesNotExist,
            },
            MemError::EdgeAlreadyExists(key) => GraphError::Edge {
                src: key.source(),
                destination: key.destination(),
                fault: EntityFault::AlreadyExists,
            },
            MemError::EdgeDoesNotExist(key) => GraphError::Edge {
                src: key.source(),
                destination: key.destination(),
                fault: EntityFault::DoesNotExist,
            },
            MemError::SelfEdge(key) => GraphError::Edge {
                src: key.source(),
                destination: key.destination(),
                fault: EntityFault::SelfEdge,
            },
            MemError::Abort | MemError::Invalid | MemError::Capacity
            | MemError::NotSureHasSource => {
                GraphError::Logical(format!("internal condition escaped the engine: {err:?}"))
            }
        }
    }
}
