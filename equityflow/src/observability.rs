//! Tracing setup helpers.

use tracing_subscriber::EnvFilter;

/// Initializes a global fmt subscriber honoring `RUST_LOG`.
///
/// Falls back to `info` when the environment provides no filter. Safe to call
/// more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
