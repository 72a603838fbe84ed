//! Tracing setup for embedding applications and tests.

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs anything.
/// Libraries embedding quarry that already configure their own
/// subscriber should simply not call this.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
