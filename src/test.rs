#![cfg(any(test, feature = "test"))]
//! Test doubles shared by unit and integration tests.

pub mod factory;

pub use backend::MockBackend;
pub use factory::CountingFactory;
pub use factory::Gate;
pub use factory::TestError;

/// Install a `RUST_LOG`-driven subscriber. Safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
