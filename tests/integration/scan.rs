//! Scan behaviour: read-after-write ordering, MVCC visibility of removed
//! edges, empty scans and the boundary faults of the write path.

use canopy::{Config, Database, EntityFault, GraphError};

fn database() -> Database {
    Database::new(Config {
        num_workers: 2,
        ..Config::default()
    })
    .expect("engine starts")
}

fn collect_out(tx: &canopy::Transaction, vertex: u64) -> Vec<(u64, f64)> {
    let mut out = Vec::new();
    tx.scan_out(vertex, |destination, weight| {
        out.push((destination, weight));
        true
    })
    .expect("scan succeeds");
    out
}

#[test]
fn two_edges_read_after_write() {
    let db = database();

    let t1 = db.start_transaction(false).unwrap();
    t1.insert_vertex(10).unwrap();
    t1.insert_vertex(20).unwrap();
    t1.insert_vertex(30).unwrap();
    t1.insert_edge(10, 20, 1020.0).unwrap();
    t1.insert_edge(10, 30, 1030.0).unwrap();
    t1.commit().unwrap();

    let t2 = db.start_transaction(true).unwrap();
    assert_eq!(collect_out(&t2, 10), vec![(20, 1020.0), (30, 1030.0)]);
}

#[test]
fn removed_edge_visibility() {
    let db = database();

    let t1 = db.start_transaction(false).unwrap();
    for v in [10, 20, 30, 40] {
        t1.insert_vertex(v).unwrap();
    }
    t1.insert_edge(10, 20, 1020.0).unwrap();
    t1.insert_edge(10, 30, 1030.0).unwrap();
    t1.insert_edge(10, 40, 1040.0).unwrap();
    t1.commit().unwrap();

    let t3 = db.start_transaction(false).unwrap();
    t3.remove_edge(10, 20).unwrap();
    t3.commit().unwrap();

    // T4 removes (10, 40) but does not commit.
    let t4 = db.start_transaction(false).unwrap();
    t4.remove_edge(10, 40).unwrap();

    // A concurrent reader sees T3's committed removal but not T4's
    // uncommitted one.
    let t5 = db.start_transaction(true).unwrap();
    assert_eq!(collect_out(&t5, 10), vec![(30, 1030.0), (40, 1040.0)]);

    // T4 itself already observes its own removal.
    assert_eq!(collect_out(&t4, 10), vec![(30, 1030.0)]);

    t4.rollback().unwrap();
    let t6 = db.start_transaction(true).unwrap();
    assert_eq!(collect_out(&t6, 10), vec![(30, 1030.0), (40, 1040.0)]);
}

#[test]
fn empty_graph_scan_invokes_nothing() {
    let db = database();
    let tx = db.start_transaction(true).unwrap();
    let mut calls = 0;
    tx.scan_out(5, |_, _| {
        calls += 1;
        true
    })
    .unwrap();
    assert_eq!(calls, 0);
}

#[test]
fn vertex_without_edges_scans_empty() {
    let db = database();
    let t1 = db.start_transaction(false).unwrap();
    t1.insert_vertex(7).unwrap();
    t1.commit().unwrap();

    let t2 = db.start_transaction(true).unwrap();
    assert_eq!(collect_out(&t2, 7), vec![]);
    assert_eq!(t2.get_degree(7).unwrap(), 0);
}

#[test]
fn boundary_faults() {
    let db = database();
    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(1).unwrap();
    tx.insert_vertex(2).unwrap();
    tx.commit().unwrap();

    let tx = db.start_transaction(false).unwrap();

    // Self edge.
    assert!(matches!(
        tx.insert_edge(7, 7, 1.0),
        Err(GraphError::Edge {
            src: 7,
            destination: 7,
            fault: EntityFault::SelfEdge
        })
    ));

    // Removing an edge that does not exist.
    assert!(matches!(
        tx.remove_edge(1, 2),
        Err(GraphError::Edge {
            src: 1,
            destination: 2,
            fault: EntityFault::DoesNotExist
        })
    ));

    // Inserting an edge whose source vertex does not exist.
    assert!(matches!(
        tx.insert_edge(9, 2, 1.0),
        Err(GraphError::Vertex {
            vertex: 9,
            fault: EntityFault::DoesNotExist
        })
    ));

    // Inserting an edge whose destination vertex does not exist.
    assert!(matches!(
        tx.insert_edge(1, 9, 1.0),
        Err(GraphError::Vertex {
            vertex: 9,
            fault: EntityFault::DoesNotExist
        })
    ));

    // Duplicate vertex.
    assert!(matches!(
        tx.insert_vertex(1),
        Err(GraphError::Vertex {
            vertex: 1,
            fault: EntityFault::AlreadyExists
        })
    ));

    // Removing a vertex that does not exist.
    assert!(matches!(
        tx.remove_vertex(99),
        Err(GraphError::Vertex {
            vertex: 99,
            fault: EntityFault::DoesNotExist
        })
    ));

    // Weight of a missing edge.
    assert!(matches!(
        tx.get_weight(1, 2),
        Err(GraphError::Edge {
            src: 1,
            destination: 2,
            fault: EntityFault::DoesNotExist
        })
    ));

    // Vertex id zero is reserved.
    assert!(matches!(tx.insert_vertex(0), Err(GraphError::Logical(_))));
    assert!(matches!(tx.has_edge(0, 1), Err(GraphError::Logical(_))));
}

#[test]
fn undirected_edges_are_symmetric() {
    let db = database();
    assert!(!db.is_directed());

    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(1).unwrap();
    tx.insert_vertex(2).unwrap();
    tx.insert_edge(1, 2, 42.0).unwrap();
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert_eq!(
        reader.has_edge(1, 2).unwrap(),
        reader.has_edge(2, 1).unwrap()
    );
    assert_eq!(
        reader.get_weight(1, 2).unwrap(),
        reader.get_weight(2, 1).unwrap()
    );

    let tx = db.start_transaction(false).unwrap();
    tx.remove_edge(2, 1).unwrap();
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert!(!reader.has_edge(1, 2).unwrap());
    assert!(!reader.has_edge(2, 1).unwrap());
}

#[test]
fn directed_edges_are_one_way() {
    let db = Database::new(Config {
        directed: true,
        num_workers: 2,
        ..Config::default()
    })
    .unwrap();
    assert!(db.is_directed());

    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(1).unwrap();
    tx.insert_vertex(2).unwrap();
    tx.insert_edge(1, 2, 5.0).unwrap();
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert!(reader.has_edge(1, 2).unwrap());
    assert!(!reader.has_edge(2, 1).unwrap());
}

#[test]
fn degree_counts_visible_edges() {
    let db = database();
    let tx = db.start_transaction(false).unwrap();
    for v in 1..=5 {
        tx.insert_vertex(v).unwrap();
    }
    for d in 2..=5 {
        tx.insert_edge(1, d, d as f64).unwrap();
    }
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    assert_eq!(reader.get_degree(1).unwrap(), 4);
    assert_eq!(reader.get_degree(2).unwrap(), 1);

    let tx = db.start_transaction(false).unwrap();
    tx.remove_edge(1, 3).unwrap();
    // Uncommitted: the writer sees the new degree, the reader the old one.
    assert_eq!(tx.get_degree(1).unwrap(), 3);
    assert_eq!(reader.get_degree(1).unwrap(), 4);
    tx.commit().unwrap();

    assert_eq!(reader.get_degree(1).unwrap(), 4, "snapshot stays stable");
    let fresh = db.start_transaction(true).unwrap();
    assert_eq!(fresh.get_degree(1).unwrap(), 3);
}
