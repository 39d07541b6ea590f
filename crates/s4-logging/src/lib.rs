//! # s4-logging
//!
//! `tracing` subscriber setup for the relay binary, plus an in-memory
//! capture layer for asserting on log output in tests.

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when neither `RUST_LOG` nor a configured level is usable.
pub const DEFAULT_LEVEL: &str = "info";

/// Build the filter: `RUST_LOG` wins, then `level`, then [`DEFAULT_LEVEL`].
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install the global subscriber writing to stderr.
///
/// `json` selects one JSON object per line instead of the compact format.
/// Returns `false` if a global subscriber was already installed.
pub fn init_subscriber(level: &str, json: bool) -> bool {
    let filter = env_filter(level);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_falls_back() {
        // Must not panic on garbage directives.
        let _filter = env_filter("[[[not a directive");
    }

    #[test]
    fn second_init_is_rejected() {
        let _ = init_subscriber("debug", false);
        assert!(!init_subscriber("info", true));
    }
}
