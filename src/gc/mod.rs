//! Epoch-based reclamation.
//!
//! Structures whose identity is swapped under readers (leaves superseded by
//! a rebalance, cached transaction sequences, merged property lists) cannot
//! be freed at the moment of the swap: an optimistic reader may still be
//! traversing them. They are instead *marked* with a deleter and an epoch;
//! a collector pass frees every marked object whose epoch lies strictly
//! before the minimum epoch published by any registered thread.

mod collector;
mod item;
mod queue;
mod tc_queue;

pub use collector::GarbageCollector;
pub use item::{Deleter, Item};
pub use queue::SimpleQueue;
pub use tc_queue::TcQueue;
