//! Logging setup for hosts that embed the cache.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` (e.g. `"warn"` or
/// `"artcache=debug"`). Returns `false` if a global subscriber was already
/// installed, in which case nothing changes.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
