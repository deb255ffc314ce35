//! The public database surface.

use std::sync::Arc;

use crate::config::Config;
use crate::context::global::GlobalContext;
use crate::error::Result;

mod iterator;
mod transaction;

pub use iterator::EdgeIterator;
pub use transaction::Transaction;

/// An in-memory MVCC graph database.
///
/// Dropping the database stops its background services; transactions still
/// referencing it fail gracefully afterwards.
pub struct Database {
    global: Arc<GlobalContext>,
}

impl Database {
    /// Creates a database with the given configuration and starts its
    /// background services.
    pub fn new(config: Config) -> Result<Database> {
        let global = GlobalContext::new(config);
        global.start();
        Ok(Database { global })
    }

    /// Creates a database with the default configuration.
    pub fn with_defaults() -> Result<Database> {
        Database::new(Config::default())
    }

    /// Starts a transaction on the calling thread, registering the thread
    /// on first use.
    pub fn start_transaction(&self, read_only: bool) -> Result<Transaction> {
        let context = self.global.thread_context()?;
        let inner = context.start_transaction(read_only)?;
        Ok(Transaction::new(inner, Arc::clone(&self.global)))
    }

    /// Registers the calling thread with the engine. Optional: threads are
    /// registered automatically on their first transaction.
    pub fn register_thread(&self) -> Result<()> {
        self.global.register_thread().map(|_| ())
    }

    /// Unregisters the calling thread.
    pub fn unregister_thread(&self) -> Result<()> {
        self.global.unregister_thread()
    }

    /// Whether edge updates follow directed-graph semantics.
    pub fn is_directed(&self) -> bool {
        self.global.memstore().is_directed()
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        self.global.config()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.global.shutdown();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("directed", &self.is_directed())
            .finish()
    }
}
