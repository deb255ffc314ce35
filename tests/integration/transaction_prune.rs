//! Undo-chain pruning and visibility resolution, exercised on raw chains
//! against a live engine clock.

use std::sync::Arc;

use canopy::config::Config;
use canopy::context::GlobalContext;
use canopy::memstore::Update;
use canopy::transaction::{prune, resolve, TransactionImpl, TransactionSequence, Undo, Visibility};

use proptest::prelude::*;

fn engine() -> Arc<GlobalContext> {
    GlobalContext::new(Config {
        num_workers: 1,
        txnlist_refresh_interval_ms: 600_000,
        gc_pass_interval_ms: 600_000,
        merger_interval_ms: 600_000,
        txnpool_pass_interval_ms: 600_000,
        ..Config::default()
    })
}

fn begin(global: &Arc<GlobalContext>) -> Arc<TransactionImpl> {
    let context = global.thread_context().unwrap();
    let tx = context.start_transaction(false).unwrap();
    tx.incr_user_count();
    tx
}

fn commit(tx: &Arc<TransactionImpl>) {
    tx.commit().unwrap();
    tx.decr_user_count();
}

fn release(tx: &Arc<TransactionImpl>) {
    if !tx.is_terminated() {
        tx.rollback().unwrap();
    }
    tx.decr_user_count();
}

/// Payloads carry their creator's start timestamp in the weight, so a
/// record can be identified after pruning rewires the chain.
fn marker(value: u64) -> Update {
    Update::insert_edge(1, 2, value as f64)
}

fn sequence_ids(sequence: &TransactionSequence) -> Vec<u64> {
    sequence.iter().collect()
}

fn payload_weight(undo: &Arc<Undo>) -> u64 {
    undo.payload().weight() as u64
}

#[test]
fn pruning_an_empty_chain_is_a_noop() {
    let global = engine();
    let sequence = global.active_transactions();
    let (head, length) = prune(None, &sequence);
    assert!(head.is_none());
    assert_eq!(length, 0);
    global.shutdown();
}

#[test]
fn pruning_drops_only_unreachable_records() {
    let global = engine();

    let tx0 = begin(&global); // ts 0
    assert_eq!(tx0.ts_read(), 0);
    let head = tx0.add_undo(marker(0), None);

    {
        let sequence = global.active_transactions();
        let (kept_head, length) = prune(Some(&head), &sequence);
        assert!(Arc::ptr_eq(kept_head.as_ref().unwrap(), &head));
        assert_eq!(length, 1, "a pending record is always kept");
    }

    commit(&tx0); // commit ts 1
    assert_eq!(tx0.ts_read(), 1);

    let tx2 = begin(&global); // ts 2
    let tx3 = begin(&global); // ts 3
    let head = tx3.add_undo(marker(3), Some(head));
    commit(&tx3); // commit ts 4

    let tx5 = begin(&global); // ts 5
    let tx6 = begin(&global); // ts 6
    let head = tx6.add_undo(marker(6), Some(head));
    commit(&tx6); // commit ts 7

    let tx8 = begin(&global); // ts 8

    let sequence = global.active_transactions();
    assert_eq!(sequence_ids(&sequence), vec![9, 8, 5, 2]);

    // Expected: ts 8 reads the live record, ts 5 reads the record of the
    // commit at 7, ts 2 the record of the commit at 4. The record of the
    // commit at 1 serves nobody.
    assert_eq!(resolve(&tx8, &head), Visibility::Live);
    assert_eq!(resolve(&tx5, &head), Visibility::Pre(marker(6)));
    assert_eq!(resolve(&tx2, &head), Visibility::Pre(marker(3)));

    let (kept_head, length) = prune(Some(&head), &sequence);
    let kept_head = kept_head.unwrap();
    assert_eq!(length, 2);
    assert!(Arc::ptr_eq(&kept_head, &head));
    assert_eq!(payload_weight(&kept_head), 6);
    let second = kept_head.next().unwrap();
    assert_eq!(payload_weight(&second), 3);
    assert!(second.next().is_none());

    // Visibility is unchanged for every active transaction.
    assert_eq!(resolve(&tx8, &kept_head), Visibility::Live);
    assert_eq!(resolve(&tx5, &kept_head), Visibility::Pre(marker(6)));
    assert_eq!(resolve(&tx2, &kept_head), Visibility::Pre(marker(3)));

    release(&tx2);
    release(&tx5);
    release(&tx8);
    global.shutdown();
}

#[test]
fn pruning_keeps_exactly_the_versions_pinned_readers_need() {
    let global = engine();

    // Commits at 1, 3, 5, 8, 11, 13, 15; readers pinned at 6, 9 and 16.
    let mut head: Option<Arc<Undo>> = None;
    let chain = |global: &Arc<GlobalContext>, head: Option<Arc<Undo>>| {
        let tx = begin(global);
        let start_ts = tx.ts_read();
        let new_head = tx.add_undo(marker(start_ts), head);
        commit(&tx);
        new_head
    };

    head = Some(chain(&global, head.take())); // ts 0, commit 1
    head = Some(chain(&global, head.take())); // ts 2, commit 3
    head = Some(chain(&global, head.take())); // ts 4, commit 5
    let reader6 = begin(&global); // ts 6
    head = Some(chain(&global, head.take())); // ts 7, commit 8
    let reader9 = begin(&global); // ts 9
    head = Some(chain(&global, head.take())); // ts 10, commit 11
    head = Some(chain(&global, head.take())); // ts 12, commit 13
    head = Some(chain(&global, head.take())); // ts 14, commit 15
    let reader16 = begin(&global); // ts 16

    let head = head.unwrap();
    let sequence = global.active_transactions();
    assert_eq!(sequence_ids(&sequence), vec![17, 16, 9, 6]);

    let before = [
        resolve(&reader16, &head),
        resolve(&reader9, &head),
        resolve(&reader6, &head),
    ];
    assert_eq!(before[0], Visibility::Live);
    assert_eq!(before[1], Visibility::Pre(marker(10)));
    assert_eq!(before[2], Visibility::Pre(marker(7)));

    let (kept_head, length) = prune(Some(&head), &sequence);
    let kept_head = kept_head.unwrap();

    // Only the records of the commits at 11 and 8 survive, newest first.
    assert_eq!(length, 2);
    assert_eq!(payload_weight(&kept_head), 10);
    let second = kept_head.next().unwrap();
    assert_eq!(payload_weight(&second), 7);
    assert!(second.next().is_none());

    let after = [
        resolve(&reader16, &kept_head),
        resolve(&reader9, &kept_head),
        resolve(&reader6, &kept_head),
    ];
    assert_eq!(before, after);

    release(&reader6);
    release(&reader9);
    release(&reader16);
    global.shutdown();
}

#[test]
fn uncommitted_records_stay_at_the_front() {
    let global = engine();

    let tx0 = begin(&global); // ts 0
    let head = tx0.add_undo(marker(0), None);
    commit(&tx0); // commit 1

    let pending = begin(&global); // ts 2
    let head = pending.add_undo(marker(2), Some(head));
    let head = pending.add_undo(marker(102), Some(head));

    let sequence = global.active_transactions();
    let (kept_head, length) = prune(Some(&head), &sequence);
    let kept_head = kept_head.unwrap();

    // Both of the pending transaction's records survive; the committed
    // record at 1 serves no reader (the only active start is 2, and the
    // pending owner reads its own live record).
    assert_eq!(length, 2);
    assert_eq!(payload_weight(&kept_head), 102);
    let second = kept_head.next().unwrap();
    assert_eq!(payload_weight(&second), 2);
    assert!(second.next().is_none());

    release(&pending);
    global.shutdown();
}

#[test]
fn a_chain_nobody_needs_vanishes() {
    let global = engine();

    let tx0 = begin(&global); // ts 0
    let head = tx0.add_undo(marker(0), None);
    commit(&tx0); // commit 1

    let sequence = global.active_transactions();
    let (kept_head, length) = prune(Some(&head), &sequence);
    assert!(kept_head.is_none());
    assert_eq!(length, 0);
    global.shutdown();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Law: for every transaction in the active sequence, the version it
    /// resolves to is identical before and after pruning.
    #[test]
    fn pruning_never_changes_what_active_readers_see(layout in prop::collection::vec(any::<bool>(), 1..14)) {
        let global = engine();
        let mut head: Option<Arc<Undo>> = None;
        let mut readers = Vec::new();

        for (index, is_reader) in layout.iter().enumerate() {
            if *is_reader {
                readers.push(begin(&global));
            } else {
                let tx = begin(&global);
                head = Some(tx.add_undo(marker(index as u64), head.take()));
                commit(&tx);
            }
        }

        if let Some(head) = head {
            let sequence = global.active_transactions();
            let before: Vec<Visibility> =
                readers.iter().map(|reader| resolve(reader, &head)).collect();

            let (kept_head, _) = prune(Some(&head), &sequence);
            let after: Vec<Visibility> = readers
                .iter()
                .map(|reader| match &kept_head {
                    Some(kept) => resolve(reader, kept),
                    None => Visibility::Live,
                })
                .collect();
            prop_assert_eq!(before, after);
        }

        for reader in &readers {
            release(reader);
        }
        global.shutdown();
    }
}
