//! Subscriber setup for the binary
//!
//! The library only emits `tracing` events inside component spans; installing
//! a subscriber is left to the process. Logs go to stderr so stdout stays
//! free for query output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` or `info`.
/// Calling this twice is harmless.
pub fn init(debug: bool, json: bool) {
    let level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_ansi(false))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };
}
