//! The edge iterator: early termination, the termination guard and the
//! logical-identifier boundary.

use canopy::{Config, Database, GraphError};

fn database() -> Database {
    Database::new(Config {
        num_workers: 2,
        ..Config::default()
    })
    .expect("engine starts")
}

/// Vertex 10 with outgoing edges to 20, 30, ..., 600; weight 1000 + d.
fn fan_out_graph(db: &Database) {
    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(10).unwrap();
    for d in (20..=600).step_by(10) {
        tx.insert_vertex(d).unwrap();
    }
    for d in (20..=600).step_by(10) {
        tx.insert_edge(10, d, 1000.0 + d as f64).unwrap();
    }
    tx.commit().unwrap();
}

#[test]
fn early_termination_stops_at_the_callback() {
    let db = database();
    fan_out_graph(&db);

    let tx = db.start_transaction(true).unwrap();
    let mut iter = tx.iterator().unwrap();
    let mut visited = Vec::new();
    iter.edges(10, false, |destination, weight| {
        visited.push(destination);
        assert_eq!(weight, 1000.0 + destination as f64);
        destination != 400
    })
    .unwrap();

    // 20, 30, ..., 400: exactly 39 invocations, in order.
    assert_eq!(visited.len(), 39);
    assert_eq!(visited.first(), Some(&20));
    assert_eq!(visited.last(), Some(&400));
    assert!(visited.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn terminating_with_an_open_iterator_fails() {
    let db = database();
    fan_out_graph(&db);

    let tx = db.start_transaction(false).unwrap();
    let iter = tx.iterator().unwrap();

    let err = tx.commit().unwrap_err();
    assert!(
        err.to_string().contains("The transaction cannot be terminated"),
        "unexpected message: {err}"
    );
    let err = tx.rollback().unwrap_err();
    assert!(err.to_string().contains("The transaction cannot be terminated"));

    drop(iter);
    tx.commit().unwrap();
}

#[test]
fn logical_identifiers_are_not_mapped_here() {
    let db = database();
    fan_out_graph(&db);

    let tx = db.start_transaction(true).unwrap();
    let mut iter = tx.iterator().unwrap();
    assert!(matches!(
        iter.edges(10, true, |_, _| true),
        Err(GraphError::Logical(_))
    ));
}

#[test]
fn iterating_a_vertex_without_edges() {
    let db = database();
    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(10).unwrap();
    tx.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();
    let mut iter = reader.iterator().unwrap();
    let mut calls = 0;
    iter.edges(10, false, |_, _| {
        calls += 1;
        true
    })
    .unwrap();
    assert_eq!(calls, 0);
}

#[test]
fn iterator_observes_its_own_uncommitted_writes() {
    let db = database();
    let tx = db.start_transaction(false).unwrap();
    tx.insert_vertex(1).unwrap();
    tx.insert_vertex(2).unwrap();
    tx.insert_edge(1, 2, 3.0).unwrap();

    let mut iter = tx.iterator().unwrap();
    let mut seen = Vec::new();
    iter.edges(1, false, |destination, weight| {
        seen.push((destination, weight));
        true
    })
    .unwrap();
    assert_eq!(seen, vec![(2, 3.0)]);
}

#[test]
fn iterator_moves_between_vertices() {
    let db = database();
    fan_out_graph(&db);

    let tx = db.start_transaction(true).unwrap();
    let mut iter = tx.iterator().unwrap();

    let mut count = 0;
    iter.edges(10, false, |_, _| {
        count += 1;
        true
    })
    .unwrap();
    assert_eq!(count, 59);

    // Vertex 20 has only its mirror edge back to 10 (undirected mode).
    let mut seen = Vec::new();
    iter.edges(20, false, |destination, weight| {
        seen.push((destination, weight));
        true
    })
    .unwrap();
    assert_eq!(seen, vec![(10, 1020.0)]);
}
