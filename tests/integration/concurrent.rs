//! Multi-threaded behaviour: disjoint writers racing with readers across
//! forced rebalances, conflicting writers with retries, and pinned readers
//! surviving leaf reclamation.

use std::sync::Arc;
use std::thread;

use canopy::{Config, Database, GraphError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Small segments so the workload continuously splits and spreads leaves.
fn stress_config() -> Config {
    Config {
        num_workers: 2,
        segment_capacity_bytes: 256,
        leaf_num_segments: 4,
        rebalance_delay_ms: 1,
        gc_pass_interval_ms: 10,
        txnlist_refresh_interval_ms: 10,
        merger_interval_ms: 50,
        ..Config::default()
    }
}

#[test]
fn disjoint_writers_with_concurrent_readers() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 120;

    let db = Arc::new(Database::new(stress_config()).unwrap());

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            let base = (writer + 1) * 10_000;
            for i in 0..PER_WRITER {
                let tx = db.start_transaction(false).unwrap();
                let v = base + i;
                tx.insert_vertex(v).unwrap();
                if i > 0 {
                    tx.insert_edge(v, v - 1, (v - 1) as f64).unwrap();
                }
                tx.commit().unwrap();
            }
        }));
    }

    // Readers sweep random vertices while the writers run; they may observe
    // any committed prefix, never a torn state.
    for reader_id in 0..2u64 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE + reader_id);
            for _ in 0..200 {
                let writer = rng.gen_range(0..WRITERS);
                let i = rng.gen_range(0..PER_WRITER);
                let v = (writer + 1) * 10_000 + i;
                let tx = db.start_transaction(true).unwrap();
                if tx.has_vertex(v).unwrap() && i > 0 && tx.has_edge(v, v - 1).unwrap() {
                    assert_eq!(tx.get_weight(v, v - 1).unwrap(), (v - 1) as f64);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Full verification after the dust settles.
    let tx = db.start_transaction(true).unwrap();
    assert_eq!(tx.num_vertices().unwrap(), WRITERS * PER_WRITER);
    assert_eq!(tx.num_edges().unwrap(), WRITERS * (PER_WRITER - 1));
    for writer in 0..WRITERS {
        let base = (writer + 1) * 10_000;
        for i in 0..PER_WRITER {
            let v = base + i;
            assert!(tx.has_vertex(v).unwrap(), "vertex {v} missing");
            if i > 0 {
                assert_eq!(tx.get_weight(v, v - 1).unwrap(), (v - 1) as f64);
            }
        }
    }
}

#[test]
fn conflicting_writers_serialise_through_retries() {
    const THREADS: u64 = 3;
    const INCREMENTS: u64 = 40;

    let db = Arc::new(Database::new(stress_config()).unwrap());
    let setup = db.start_transaction(false).unwrap();
    setup.insert_vertex(1).unwrap();
    setup.insert_vertex(2).unwrap();
    setup.insert_edge(1, 2, 0.0).unwrap();
    setup.commit().unwrap();

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            let mut done = 0;
            while done < INCREMENTS {
                let tx = db.start_transaction(false).unwrap();
                let attempt = (|| -> Result<(), GraphError> {
                    let weight = tx.get_weight(1, 2)?;
                    tx.remove_edge(1, 2)?;
                    tx.insert_edge(1, 2, weight + 1.0)?;
                    tx.commit()
                })();
                match attempt {
                    Ok(()) => done += 1,
                    Err(_) => {
                        // Lost the race; roll back and try again.
                        let _ = tx.rollback();
                        thread::yield_now();
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let tx = db.start_transaction(true).unwrap();
    assert_eq!(
        tx.get_weight(1, 2).unwrap(),
        (THREADS * INCREMENTS) as f64,
        "every successful increment is serialised"
    );
}

#[test]
fn pinned_reader_survives_splits_and_reclamation() {
    let db = Arc::new(Database::new(stress_config()).unwrap());

    // Baseline: vertex 1 with 30 edges.
    let setup = db.start_transaction(false).unwrap();
    setup.insert_vertex(1).unwrap();
    for d in 2..=31 {
        setup.insert_vertex(d).unwrap();
        setup.insert_edge(1, d, d as f64).unwrap();
    }
    setup.commit().unwrap();

    let reader = db.start_transaction(true).unwrap();

    // Churn: enough inserts to force repeated splits, plus removals on the
    // baseline's neighbours committed after the reader started.
    let churn = db.start_transaction(false).unwrap();
    for v in 1_000..1_400u64 {
        churn.insert_vertex(v).unwrap();
        if v > 1_000 {
            churn.insert_edge(v, v - 1, 1.0).unwrap();
        }
    }
    churn.commit().unwrap();

    let remover = db.start_transaction(false).unwrap();
    for d in 2..=10 {
        remover.remove_edge(1, d).unwrap();
    }
    remover.commit().unwrap();

    // Give the maintenance services time to run passes over the retired
    // leaves while the reader stays pinned.
    thread::sleep(std::time::Duration::from_millis(200));

    let mut seen = Vec::new();
    reader
        .scan_out(1, |destination, weight| {
            seen.push((destination, weight));
            true
        })
        .unwrap();
    let expected: Vec<(u64, f64)> = (2..=31).map(|d| (d, d as f64)).collect();
    assert_eq!(seen, expected, "the pinned snapshot is fully preserved");
    assert!(!reader.has_vertex(1_000).unwrap());

    drop(reader);
    let fresh = db.start_transaction(true).unwrap();
    assert_eq!(fresh.get_degree(1).unwrap(), 21);
    assert!(fresh.has_vertex(1_399).unwrap());
}
