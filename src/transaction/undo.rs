//! Undo records and version chains.
//!
//! Every mutated slot carries a chain of undo records, newest first. A
//! record stores the *pre-image* of its owner's change: the update that
//! reinstalls the slot as it was before. The chain therefore serves three
//! masters: rollback (replay the pre-image), snapshot reads (resolve which
//! version a reader sees) and pruning (drop records no active reader can
//! still need).

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::memstore::update::Update;

use super::list::TransactionSequence;
use super::transaction::TransactionImpl;

/// A single undo record.
pub struct Undo {
    owner: Arc<TransactionImpl>,
    payload: Update,
    next: Mutex<Option<Arc<Undo>>>,
}

impl Undo {
    /// Creates a record owned by `owner` whose pre-image is `payload`,
    /// linked in front of `next`.
    pub(crate) fn link(
        owner: Arc<TransactionImpl>,
        payload: Update,
        next: Option<Arc<Undo>>,
    ) -> Arc<Undo> {
        Arc::new(Undo {
            owner,
            payload,
            next: Mutex::new(next),
        })
    }

    /// The transaction that produced this record.
    pub fn owner(&self) -> &Arc<TransactionImpl> {
        &self.owner
    }

    /// The pre-image update.
    pub fn payload(&self) -> &Update {
        &self.payload
    }

    /// The next (older) record in the chain.
    pub fn next(&self) -> Option<Arc<Undo>> {
        self.next.lock().clone()
    }

    pub(crate) fn set_next(&self, next: Option<Arc<Undo>>) {
        *self.next.lock() = next;
    }

    /// Chain length starting at `head`, for diagnostics and tests.
    pub fn chain_length(head: &Arc<Undo>) -> usize {
        let mut length = 1;
        let mut current = Arc::clone(head);
        while let Some(next) = current.next() {
            length += 1;
            current = next;
        }
        length
    }
}

impl std::fmt::Debug for Undo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Undo")
            .field("owner_ts", &self.owner.ts_read())
            .field("payload", &self.payload)
            .finish()
    }
}

/// What a reader sees when resolving a slot against its version chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Visibility {
    /// The live record in the slot is the visible version.
    Live,
    /// The given pre-image is the visible version. A `Remove` pre-image
    /// means the slot is absent in the reader's snapshot.
    Pre(Update),
}

/// Resolves which version of a slot the transaction `reader` observes.
///
/// The reader sees the live record when it owns the head or when the head's
/// change committed before the reader started. Otherwise it sees the
/// pre-image of the oldest change that is still invisible to it.
pub fn resolve(reader: &TransactionImpl, head: &Arc<Undo>) -> Visibility {
    if std::ptr::eq(Arc::as_ptr(head.owner()), reader) {
        return Visibility::Live;
    }
    let my_id = reader.ts_read();
    if head.owner().ts_write() < my_id {
        return Visibility::Live;
    }

    let mut current = Arc::clone(head);
    loop {
        match current.next() {
            Some(older) if older.owner().ts_write() < my_id => {
                // `older` is visible, so `current` is the oldest invisible
                // change; its pre-image is the reader's version.
                return Visibility::Pre(*current.payload());
            }
            Some(older) => current = older,
            None => return Visibility::Pre(*current.payload()),
        }
    }
}

/// Prunes a version chain against a snapshot of the active transactions.
///
/// Uncommitted records at the front are always kept. A committed record `c`
/// whose next older committed neighbour has commit timestamp `p` (zero when
/// none) survives iff some active timestamp `s` satisfies `p <= s < c`:
/// such a reader still resolves to `c`'s pre-image. Everything else is
/// unlinked.
///
/// Must be called under the segment's writer or rebalancer latch; optimistic
/// readers may still hold references into dropped records, which stay alive
/// until those references are gone.
///
/// Returns the new head and the number of records kept.
pub fn prune(
    head: Option<&Arc<Undo>>,
    active: &TransactionSequence,
) -> (Option<Arc<Undo>>, usize) {
    let Some(head) = head else {
        return (None, 0);
    };

    let mut records: SmallVec<[Arc<Undo>; 8]> = SmallVec::new();
    let mut current = Some(Arc::clone(head));
    while let Some(record) = current {
        current = record.next();
        records.push(record);
    }

    let mut kept: SmallVec<[Arc<Undo>; 8]> = SmallVec::new();
    let mut index = 0;
    while index < records.len() && !records[index].owner().is_committed() {
        kept.push(Arc::clone(&records[index]));
        index += 1;
    }

    let committed = &records[index..];
    for (position, record) in committed.iter().enumerate() {
        let commit_ts = record.owner().ts_read();
        let previous_commit = committed
            .get(position + 1)
            .map(|older| older.owner().ts_read())
            .unwrap_or(0);
        if active.any_in(previous_commit, commit_ts) {
            kept.push(Arc::clone(record));
        }
    }

    for position in 0..kept.len() {
        kept[position].set_next(kept.get(position + 1).cloned());
    }
    let length = kept.len();
    (kept.into_iter().next(), length)
}

// The behavioural tests for resolve/prune need a full engine (transactions
// draw timestamps from the global clock); they live in
// tests/integration/transaction_prune.rs.
