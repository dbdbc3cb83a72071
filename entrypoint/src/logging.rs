//! Coordinator diagnostics.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: coordinator milestones and failures via
//!   `RUST_LOG`, written to stderr with timestamps.
//!
//! - **Task output (`io/process`)**: the child's combined output, relayed live
//!   on stdout and recorded byte-for-byte under the generation directory.
//!   Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=entrypoint=debug entrypoint
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
