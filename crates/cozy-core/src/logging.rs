#![forbid(unsafe_code)]

//! JSON log output for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

/// Install a JSON formatter filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}
