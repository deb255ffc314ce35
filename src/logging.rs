//! Optional process-wide logging installation.
//!
//! The engine emits structured events through [`tracing`]; embedding
//! applications that already install a subscriber can ignore this module.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call more than once; only the first call has an effect. Returns
/// `false` when another subscriber was already installed.
pub fn init() -> bool {
    let mut installed = false;
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();
    });
    installed
}
