#![cfg(feature = "mock")]

//! Test support: an in-memory [`CatalogBackend`](crate::CatalogBackend) with knobs for latency, failures and call
//! accounting.

pub mod mock;

/// Install a `RUST_LOG`-driven subscriber writing to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
