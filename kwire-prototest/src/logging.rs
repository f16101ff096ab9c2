//! Log output for tests.

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber writing through the test harness' capture.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Later calls are
/// no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
