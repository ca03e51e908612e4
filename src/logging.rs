//! Tracing subscriber setup for hosts embedding the resolver.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "DISPATCH_DISTANCE_LOG";

/// Initializes a `tracing_subscriber` using `DISPATCH_DISTANCE_LOG` first, then
/// `RUST_LOG`, then `info`.
///
/// Span/field contract for distance runs:
/// - `distance_run` spans carry `generation` and `destination`.
/// - Phase transitions log `from`/`to`; tier events log their counts.
pub fn init_tracing() {
    let filter = env_filter();
    // A host application may already own the global subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
