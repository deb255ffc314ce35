//! The tagged operation applied to a storage slot.
//!
//! An [`Update`] describes a single mutation: insert or remove, vertex or
//! edge. The same struct doubles as the undo payload: the record pushed on a
//! version chain is the pre-image `Update` that reinstalls the previous state
//! of the slot when rolled back or when resolved by a snapshot reader.

use super::key::Key;

/// Whether the slot holds a vertex or an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// A vertex record, keyed `(v, 0)`.
    Vertex,
    /// An edge record, keyed `(source, destination)`.
    Edge,
}

/// Insert or remove.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// The slot holds (or will hold) a live record.
    Insert,
    /// The slot is (or becomes) logically absent.
    Remove,
}

/// A single mutation of a storage slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Update {
    key: Key,
    entry: EntryKind,
    op: OpKind,
    weight: f64,
}

impl Update {
    /// Insert the vertex `v`.
    pub fn insert_vertex(v: u64) -> Self {
        Self {
            key: Key::vertex(v),
            entry: EntryKind::Vertex,
            op: OpKind::Insert,
            weight: 0.0,
        }
    }

    /// Remove the vertex `v`.
    pub fn remove_vertex(v: u64) -> Self {
        Self {
            key: Key::vertex(v),
            entry: EntryKind::Vertex,
            op: OpKind::Remove,
            weight: 0.0,
        }
    }

    /// Insert the edge `source -> destination` with the given weight.
    pub fn insert_edge(source: u64, destination: u64, weight: f64) -> Self {
        Self {
            key: Key::new(source, destination),
            entry: EntryKind::Edge,
            op: OpKind::Insert,
            weight,
        }
    }

    /// Remove the edge `source -> destination`.
    pub fn remove_edge(source: u64, destination: u64) -> Self {
        Self {
            key: Key::new(source, destination),
            entry: EntryKind::Edge,
            op: OpKind::Remove,
            weight: 0.0,
        }
    }

    /// The slot this update refers to.
    pub fn key(&self) -> Key {
        self.key
    }

    /// Vertex or edge.
    pub fn entry(&self) -> EntryKind {
        self.entry
    }

    /// Insert or remove.
    pub fn op(&self) -> OpKind {
        self.op
    }

    /// Weight carried by an edge insert; zero otherwise.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Whether this update makes the slot live.
    pub fn is_insert(&self) -> bool {
        self.op == OpKind::Insert
    }

    /// Whether this update makes the slot logically absent.
    pub fn is_remove(&self) -> bool {
        self.op == OpKind::Remove
    }

    /// Whether this update targets a vertex slot.
    pub fn is_vertex(&self) -> bool {
        self.entry == EntryKind::Vertex
    }

    /// Whether this update targets an edge slot.
    pub fn is_edge(&self) -> bool {
        self.entry == EntryKind::Edge
    }

    /// The pre-image of applying `self` on a slot whose current live state
    /// is `current` (`None` when the slot is logically absent).
    pub fn pre_image(&self, current: Option<f64>) -> Update {
        match current {
            Some(weight) => Update {
                key: self.key,
                entry: self.entry,
                op: OpKind::Insert,
                weight,
            },
            None => Update {
                key: self.key,
                entry: self.entry,
                op: OpKind::Remove,
                weight: 0.0,
            },
        }
    }
}

impl std::fmt::Display for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.op {
            OpKind::Insert => "insert",
            OpKind::Remove => "remove",
        };
        match self.entry {
            EntryKind::Vertex => write!(f, "{op} vertex {}", self.key.source()),
            EntryKind::Edge => write!(f, "{op} edge {} ({})", self.key, self.weight),
        }
    }
}
