//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that wants resolver and
//! aggregator events captured by the test harness. The subscriber is
//! installed at most once per process.

use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "ctxmesh_core=info";

/// Install a test-writer subscriber honouring `RUST_LOG`.
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     ctxmesh_test_utils::tracing_setup::init_test_tracing();
///     tracing::info!("visible when RUST_LOG=info");
/// }
/// ```
pub fn init_test_tracing() {
    init_test_tracing_with(DEFAULT_DIRECTIVE);
}

/// Like [`init_test_tracing`] with an explicit fallback directive, e.g.
/// `"ctxmesh_core::discoverer=debug"` to trace resolution decisions.
pub fn init_test_tracing_with(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
