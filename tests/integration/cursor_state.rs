//! Cursor save/resume: an iterator keeps its reader latch between calls
//! and continues from the saved position when the next vertex is nearby.

use canopy::{Config, Database};

/// Tiny segments (4 elements each) so a single vertex's edges span several
/// segments and leaves.
fn tiny_segment_db() -> Database {
    Database::new(Config {
        num_workers: 2,
        segment_capacity_bytes: 128,
        leaf_num_segments: 4,
        directed: true,
        merger_interval_ms: 600_000,
        ..Config::default()
    })
    .expect("engine starts")
}

fn populate(db: &Database) {
    let tx = db.start_transaction(false).unwrap();
    for v in 100..=110 {
        tx.insert_vertex(v).unwrap();
    }
    tx.insert_vertex(10).unwrap();
    tx.insert_vertex(30).unwrap();
    for d in 100..109 {
        tx.insert_edge(10, d, d as f64).unwrap();
    }
    tx.insert_edge(30, 100, 3100.0).unwrap();
    tx.insert_edge(30, 101, 3101.0).unwrap();
    tx.commit().unwrap();
}

#[test]
fn resume_across_segments() {
    let db = tiny_segment_db();
    populate(&db);

    let reader = db.start_transaction(true).unwrap();
    let mut iter = reader.iterator().unwrap();

    let mut first = Vec::new();
    iter.edges(10, false, |destination, weight| {
        first.push((destination, weight));
        true
    })
    .unwrap();
    let expected: Vec<(u64, f64)> = (100..109).map(|d| (d, d as f64)).collect();
    assert_eq!(first, expected, "all nine edges, in destination order");

    // The cursor stopped on vertex 30's territory and kept its latch.
    assert!(iter.has_position());

    let mut second = Vec::new();
    iter.edges(30, false, |destination, weight| {
        second.push((destination, weight));
        true
    })
    .unwrap();
    assert_eq!(second, vec![(100, 3100.0), (101, 3101.0)]);
}

#[test]
fn resume_across_a_noop_writer_is_identical() {
    let db = tiny_segment_db();
    populate(&db);

    let reader = db.start_transaction(true).unwrap();
    let mut iter = reader.iterator().unwrap();

    let mut first = Vec::new();
    iter.edges(10, false, |destination, weight| {
        first.push((destination, weight));
        true
    })
    .unwrap();

    // A writer that commits without touching anything.
    let noop = db.start_transaction(false).unwrap();
    noop.commit().unwrap();

    let mut second = Vec::new();
    iter.edges(10, false, |destination, weight| {
        second.push((destination, weight));
        true
    })
    .unwrap();
    assert_eq!(first, second);
}

#[test]
fn early_stop_saves_and_resumes_forward() {
    let db = tiny_segment_db();
    populate(&db);

    let reader = db.start_transaction(true).unwrap();
    let mut iter = reader.iterator().unwrap();

    let mut seen = Vec::new();
    iter.edges(10, false, |destination, _| {
        seen.push(destination);
        destination < 103
    })
    .unwrap();
    assert_eq!(seen, vec![100, 101, 102, 103]);

    // Moving on to a later vertex works regardless of where the previous
    // call stopped.
    let mut next = Vec::new();
    iter.edges(30, false, |destination, _| {
        next.push(destination);
        true
    })
    .unwrap();
    assert_eq!(next, vec![100, 101]);
}

#[test]
fn closing_the_iterator_releases_its_latch() {
    let db = tiny_segment_db();
    populate(&db);

    let reader = db.start_transaction(true).unwrap();
    let mut iter = reader.iterator().unwrap();
    iter.edges(10, false, |_, _| true).unwrap();
    assert!(iter.has_position());
    drop(iter);

    // A writer on the previously latched territory succeeds; a leaked
    // reader latch would block it forever.
    let writer = db.start_transaction(false).unwrap();
    writer.insert_edge(30, 102, 3102.0).unwrap();
    writer.commit().unwrap();

    let check = db.start_transaction(true).unwrap();
    assert!(check.has_edge(30, 102).unwrap());
}
