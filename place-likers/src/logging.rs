//! Tracing setup for the place-likers CLI.
//!
//! Session progress ("Handle CafeA", limit summaries, retries) is logged at
//! `info`, so that is the default level. Output goes to stderr; stdout is left
//! to command output such as `plan`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to `info`.
///
/// # Example
/// ```bash
/// RUST_LOG=place_likers=debug place-likers run --place-likers-top CafeA
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
