//! Snapshot-isolation semantics at the public boundary: dirty reads,
//! snapshot stability, conflicts, rollback round trips and the global
//! vertex/edge counters.

use canopy::{Config, Database, GraphError};

fn database() -> Database {
    Database::new(Config {
        num_workers: 2,
        ..Config::default()
    })
    .expect("engine starts")
}

#[test]
fn uncommitted_writes_are_invisible() {
    let db = database();

    let writer = db.start_transaction(false).unwrap();
    writer.insert_vertex(1).unwrap();
    assert!(writer.has_vertex(1).unwrap(), "writers see their own changes");

    let reader = db.start_transaction(true).unwrap();
    assert!(!reader.has_vertex(1).unwrap());

    writer.commit().unwrap();
    assert!(!reader.has_vertex(1).unwrap(), "snapshots are stable");

    let fresh = db.start_transaction(true).unwrap();
    assert!(fresh.has_vertex(1).unwrap());
}

#[test]
fn snapshot_stays_stable_across_commits() {
    let db = database();
    let setup = db.start_transaction(false).unwrap();
    setup.insert_vertex(1).unwrap();
    setup.insert_vertex(2).unwrap();
    setup.insert_edge(1, 2, 1.0).unwrap();
    setup.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert_eq!(reader.get_weight(1, 2).unwrap(), 1.0);

    let writer = db.start_transaction(false).unwrap();
    writer.remove_edge(1, 2).unwrap();
    writer.insert_edge(1, 2, 2.0).unwrap();
    writer.commit().unwrap();

    assert_eq!(reader.get_weight(1, 2).unwrap(), 1.0);
    let fresh = db.start_transaction(true).unwrap();
    assert_eq!(fresh.get_weight(1, 2).unwrap(), 2.0);
}

#[test]
fn rollback_leaves_the_graph_unchanged() {
    let db = database();
    let setup = db.start_transaction(false).unwrap();
    setup.insert_vertex(1).unwrap();
    setup.insert_vertex(2).unwrap();
    setup.commit().unwrap();

    let tx = db.start_transaction(false).unwrap();
    tx.insert_edge(1, 2, 9.0).unwrap();
    assert!(tx.has_edge(1, 2).unwrap());
    tx.rollback().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert!(!reader.has_edge(1, 2).unwrap());
    assert!(!reader.has_edge(2, 1).unwrap());
}

#[test]
fn vertex_count_round_trip() {
    let db = database();

    let baseline = db.start_transaction(true).unwrap();
    let initial = baseline.num_vertices().unwrap();
    drop(baseline);

    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(42).unwrap();
    tx.commit().unwrap();

    let mid = db.start_transaction(true).unwrap();
    assert_eq!(mid.num_vertices().unwrap(), initial + 1);
    drop(mid);

    let tx = db.start_transaction(false).unwrap();
    tx.remove_vertex(42).unwrap();
    tx.commit().unwrap();

    let after = db.start_transaction(true).unwrap();
    assert_eq!(after.num_vertices().unwrap(), initial);
}

#[test]
fn edge_count_tracks_logical_edges() {
    let db = database();
    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(1).unwrap();
    tx.insert_vertex(2).unwrap();
    tx.insert_vertex(3).unwrap();
    tx.insert_edge(1, 2, 1.0).unwrap();
    tx.insert_edge(2, 3, 1.0).unwrap();
    // The transaction's own counters include its uncommitted delta.
    assert_eq!(tx.num_edges().unwrap(), 2);
    assert_eq!(tx.num_vertices().unwrap(), 3);
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert_eq!(reader.num_edges().unwrap(), 2);

    let tx = db.start_transaction(false).unwrap();
    let degree = tx.remove_vertex(2).unwrap();
    assert_eq!(degree, 2);
    tx.commit().unwrap();

    let fresh = db.start_transaction(true).unwrap();
    assert_eq!(fresh.num_edges().unwrap(), 0);
    assert_eq!(fresh.num_vertices().unwrap(), 2);
    // The old reader still sees the old counters.
    assert_eq!(reader.num_edges().unwrap(), 2);
}

#[test]
fn racing_writers_conflict() {
    let db = database();
    let setup = db.start_transaction(false).unwrap();
    setup.insert_vertex(1).unwrap();
    setup.insert_vertex(2).unwrap();
    setup.commit().unwrap();

    let t1 = db.start_transaction(false).unwrap();
    let t2 = db.start_transaction(false).unwrap();
    t1.insert_edge(1, 2, 1.0).unwrap();

    // The slot is locked by t1's in-flight change.
    assert!(matches!(
        t2.insert_edge(1, 2, 2.0),
        Err(GraphError::Conflict(_))
    ));

    t1.commit().unwrap();
    drop(t2);

    // A transaction started after the commit proceeds normally.
    let t3 = db.start_transaction(false).unwrap();
    assert!(t3.has_edge(1, 2).unwrap());
    t3.remove_edge(1, 2).unwrap();
    t3.commit().unwrap();
}

#[test]
fn first_committer_wins() {
    let db = database();
    let setup = db.start_transaction(false).unwrap();
    setup.insert_vertex(1).unwrap();
    setup.insert_vertex(2).unwrap();
    setup.insert_vertex(3).unwrap();
    setup.insert_edge(1, 2, 1.0).unwrap();
    setup.commit().unwrap();

    // t_old starts before the competing writer commits.
    let t_old = db.start_transaction(false).unwrap();
    let t_new = db.start_transaction(false).unwrap();
    t_new.remove_edge(1, 2).unwrap();
    t_new.commit().unwrap();

    // t_old raced and lost: the slot committed after its start.
    assert!(matches!(
        t_old.remove_edge(1, 2),
        Err(GraphError::Conflict(_))
    ));
    t_old.rollback().unwrap();
}

#[test]
fn partial_failure_forces_rollback() {
    let db = database();
    let setup = db.start_transaction(false).unwrap();
    for v in [1, 2, 3] {
        setup.insert_vertex(v).unwrap();
    }
    setup.insert_edge(1, 2, 12.0).unwrap();
    setup.insert_edge(1, 3, 13.0).unwrap();
    setup.commit().unwrap();

    // A pending transaction locks vertex 3's slots.
    let blocker = db.start_transaction(false).unwrap();
    blocker.remove_vertex(3).unwrap();

    // Removing vertex 1 cascades over (1,2), (2,1), then (1,3), which is
    // locked: the transaction has already mutated and lands in the error
    // state.
    let victim = db.start_transaction(false).unwrap();
    assert!(matches!(
        victim.remove_vertex(1),
        Err(GraphError::Conflict(_))
    ));
    let err = victim.commit().unwrap_err();
    assert!(
        err.to_string().contains("error state"),
        "unexpected message: {err}"
    );
    victim.rollback().unwrap();
    blocker.rollback().unwrap();

    // Everything is back in place.
    let reader = db.start_transaction(true).unwrap();
    assert!(reader.has_vertex(1).unwrap());
    assert!(reader.has_vertex(3).unwrap());
    assert_eq!(reader.get_weight(1, 2).unwrap(), 12.0);
    assert_eq!(reader.get_weight(3, 1).unwrap(), 13.0);
}

#[test]
fn remove_vertex_cascades_over_both_directions() {
    let db = database();
    let setup = db.start_transaction(false).unwrap();
    for v in [1, 2, 3, 4] {
        setup.insert_vertex(v).unwrap();
    }
    setup.insert_edge(1, 2, 1.0).unwrap();
    setup.insert_edge(1, 3, 2.0).unwrap();
    setup.insert_edge(1, 4, 3.0).unwrap();
    setup.commit().unwrap();

    let tx = db.start_transaction(false).unwrap();
    assert_eq!(tx.remove_vertex(1).unwrap(), 3);
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert!(!reader.has_vertex(1).unwrap());
    for v in [2, 3, 4] {
        assert!(reader.has_vertex(v).unwrap());
        assert_eq!(reader.get_degree(v).unwrap(), 0, "mirror edges are gone");
    }
}

#[test]
fn terminated_transactions_reject_further_work() {
    let db = database();
    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(1).unwrap();
    tx.commit().unwrap();

    assert!(matches!(tx.insert_vertex(2), Err(GraphError::Logical(_))));
    assert!(matches!(tx.has_vertex(1), Err(GraphError::Logical(_))));
    let err = tx.commit().unwrap_err();
    assert!(err.to_string().contains("already terminated"));
    let err = tx.rollback().unwrap_err();
    assert!(err.to_string().contains("already terminated"));
}

#[test]
fn read_only_transactions_reject_writes() {
    let db = database();
    let tx = db.start_transaction(true).unwrap();
    assert!(matches!(tx.insert_vertex(1), Err(GraphError::Logical(_))));
    assert!(matches!(tx.remove_vertex(1), Err(GraphError::Logical(_))));
    assert!(matches!(
        tx.insert_edge(1, 2, 0.0),
        Err(GraphError::Logical(_))
    ));
    tx.commit().unwrap();
}
