//! Transactions, undo chains and active-transaction snapshots.

mod list;
mod pool;
mod transaction;
mod undo;

pub use list::{TransactionList, TransactionSequence, TRANSACTIONS_PER_THREAD};
pub use pool::{TransactionPool, UndoLog};
pub use transaction::{TransactionImpl, TxState, TS_LOCKED_BIAS};
pub use undo::{prune, resolve, Undo, Visibility};
