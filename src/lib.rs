//! # Canopy — In-Memory MVCC Graph Storage Engine
//!
//! Canopy is a transactional, in-memory graph storage engine with
//! snapshot-isolation multi-version concurrency control over a mutable
//! graph of vertices and weighted edges.
//!
//! ## Quick start
//!
//! ```rust
//! use canopy::{Config, Database};
//!
//! let db = Database::new(Config::default())?;
//!
//! let tx = db.start_transaction(false)?;
//! tx.insert_vertex(10)?;
//! tx.insert_vertex(20)?;
//! tx.insert_edge(10, 20, 1020.0)?;
//! tx.commit()?;
//!
//! let reader = db.start_transaction(true)?;
//! assert!(reader.has_edge(10, 20)?);
//! assert_eq!(reader.get_weight(10, 20)?, 1020.0);
//! # Ok::<(), canopy::GraphError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Memstore**: a trie-indexed tree of fixed-capacity leaves; each leaf
//!   is partitioned into segments alternating between a sorted "sparse
//!   file" and a hash-based "dense file" layout. The segment is the unit of
//!   latching and rebalancing.
//! - **Transactions**: a global timestamp stream, per-thread active lists,
//!   undo chains with visibility-preserving pruning.
//! - **Concurrency substrate**: a 64-bit segment latch with shared,
//!   exclusive, rebalancer and optimistic-versioned modes; epoch-based
//!   reclamation for structures swapped under readers.
//! - **Runtime**: a fixed worker pool and a timer service executing
//!   rebalances, garbage collection and cache maintenance in the
//!   background.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gc;
pub mod logging;
pub mod memstore;
pub mod rebalance;
pub mod runtime;
pub mod sync;
pub mod transaction;

pub use crate::config::Config;
pub use crate::db::{Database, EdgeIterator, Transaction};
pub use crate::error::{EntityFault, GraphError, Result};
