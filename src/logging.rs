//! Tracing bootstrap for the initializer controller.
//!
//! Events go to stderr as plain formatted lines; verbosity defaults to INFO
//! and follows `RUST_LOG` when set.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Install the global subscriber. Call once at startup, before the
/// controller emits its first event.
pub(crate) fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(env_filter),
        )
        .init();
}
