//! Tracing setup.

use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Install the stdout subscriber, honoring `RUST_LOG`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);
    tracing_subscriber::registry().with(filter).with(stdout_layer).init();
}
