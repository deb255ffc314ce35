use thiserror::Error;

/// Convenience alias used across the public API.
pub type Result<T> = std::result::Result<T, GraphError>;

/// What went wrong with a vertex or an edge, as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFault {
    /// The vertex or edge does not exist in the caller's snapshot.
    DoesNotExist,
    /// The vertex or edge already exists in the caller's snapshot.
    AlreadyExists,
    /// Source and destination are the same vertex.
    SelfEdge,
}

impl std::fmt::Display for EntityFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityFault::DoesNotExist => write!(f, "does not exist"),
            EntityFault::AlreadyExists => write!(f, "already exists"),
            EntityFault::SelfEdge => write!(f, "is a self edge"),
        }
    }
}

/// Errors crossing the public boundary of the engine.
///
/// Internal retryable conditions (optimistic aborts, invalidated segments,
/// capacity overflows) never surface here; they are absorbed by the storage
/// layer and translated into retries or rebalances.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The operation violates the data model or the transaction lifecycle.
    #[error("{0}")]
    Logical(String),

    /// Two transactions raced for the same record. The transaction must be
    /// rolled back and retried by the caller.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A vertex-level fault, carrying the user-provided identifier.
    #[error("vertex {vertex} {fault}")]
    Vertex {
        /// The vertex the operation referred to.
        vertex: u64,
        /// The specific fault.
        fault: EntityFault,
    },

    /// An edge-level fault, carrying the user-provided identifiers.
    #[error("edge {src} -> {destination} {fault}")]
    Edge {
        /// Source vertex of the offending edge.
        src: u64,
        /// Destination vertex of the offending edge.
        destination: u64,
        /// The specific fault.
        fault: EntityFault,
    },

    /// The per-segment reader counter is saturated.
    #[error("too many readers are accessing the same segment")]
    TooManyReaders,
}

impl GraphError {
    /// Shorthand for a [`GraphError::Logical`] with a formatted message.
    pub fn logical(msg: impl Into<String>) -> Self {
        GraphError::Logical(msg.into())
    }
}
