//! Global graph properties, materialised per snapshot.
//!
//! Vertex and edge counts are not stored next to the data; each committed
//! transaction appends its delta, tagged with its commit timestamp, and a
//! reader sums every delta visible at its start timestamp. Deltas older than
//! the oldest active transaction are folded into a base value.

use crate::sync::OptimisticLatch;
use crate::transaction::TransactionSequence;

/// Aggregate counters attached to the graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphProperty {
    /// Number of vertices.
    pub vertex_count: i64,
    /// Number of logical edges.
    pub edge_count: i64,
}

impl GraphProperty {
    /// Whether the delta carries any change.
    pub fn is_change(&self) -> bool {
        self.vertex_count != 0 || self.edge_count != 0
    }
}

impl std::ops::AddAssign for GraphProperty {
    fn add_assign(&mut self, rhs: Self) {
        self.vertex_count += rhs.vertex_count;
        self.edge_count += rhs.edge_count;
    }
}

impl std::ops::Add for GraphProperty {
    type Output = GraphProperty;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

/// One committed delta.
#[derive(Clone, Copy, Debug)]
pub struct PropertySnapshot {
    /// Commit timestamp of the transaction that produced the delta.
    pub transaction_id: u64,
    /// The delta itself.
    pub property: GraphProperty,
}

/// Prune automatically once the list grows past this many entries.
const AUTO_PRUNE_SIZE: usize = 8;

#[derive(Default)]
struct Entries {
    /// Sum of every pruned delta; included in all snapshots.
    base: GraphProperty,
    /// Live deltas, sorted by commit timestamp ascending.
    list: Vec<PropertySnapshot>,
}

/// A commit-ordered list of property deltas guarded by an optimistic latch.
#[derive(Default)]
pub struct PropertySnapshotList {
    latch: OptimisticLatch<Entries>,
}

impl PropertySnapshotList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a committed delta.
    ///
    /// When a snapshot of the active transactions is at hand and the list
    /// has grown beyond [`AUTO_PRUNE_SIZE`], stale entries are folded away
    /// in the same critical section.
    pub fn insert(&self, snapshot: PropertySnapshot, active: Option<&TransactionSequence>) {
        self.latch.write(|entries| {
            let position = entries
                .list
                .partition_point(|e| e.transaction_id <= snapshot.transaction_id);
            entries.list.insert(position, snapshot);

            if entries.list.len() > AUTO_PRUNE_SIZE {
                if let Some(active) = active {
                    fold_older_than(entries, active.high_water_mark());
                }
            }
        });
    }

    /// Folds every delta no active transaction can distinguish from the base.
    pub fn prune(&self, active: &TransactionSequence) {
        self.prune_high_water_mark(active.high_water_mark());
    }

    /// Folds every delta with a commit timestamp at or below `mark`.
    pub fn prune_high_water_mark(&self, mark: u64) {
        self.latch.write(|entries| fold_older_than(entries, mark));
    }

    /// Absorbs the content of `other`, leaving it empty. Used when a thread
    /// context unregisters and its local list must survive.
    pub fn acquire(&self, other: &PropertySnapshotList) {
        let (base, mut list) = other.latch.write(|entries| {
            let base = std::mem::take(&mut entries.base);
            let list = std::mem::take(&mut entries.list);
            (base, list)
        });
        self.latch.write(|entries| {
            entries.base += base;
            entries.list.append(&mut list);
            entries
                .list
                .sort_by_key(|snapshot| snapshot.transaction_id);
        });
    }

    /// Sums every delta visible at the given read timestamp.
    pub fn snapshot(&self, transaction_id: u64) -> GraphProperty {
        self.latch.optimistic(|entries| {
            let mut total = entries.base;
            for entry in &entries.list {
                if entry.transaction_id > transaction_id {
                    break;
                }
                total += entry.property;
            }
            total
        })
    }

    /// Number of unfolded deltas, for diagnostics.
    pub fn len(&self) -> usize {
        self.latch.read(|entries| entries.list.len())
    }

    /// Whether no unfolded delta remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn fold_older_than(entries: &mut Entries, mark: u64) {
    let cut = entries
        .list
        .partition_point(|entry| entry.transaction_id <= mark);
    for entry in entries.list.drain(..cut) {
        entries.base += entry.property;
    }
}
