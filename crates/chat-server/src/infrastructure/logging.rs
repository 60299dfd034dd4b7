//! Logging setup.
//!
//! Installs a `tracing_subscriber::fmt` subscriber.  The filter comes from
//! `RUST_LOG` when set, otherwise from the configured level.  Every line is
//! stamped with the time elapsed since start-up rather than wall-clock time,
//! which makes the 10 ms loop cadence easy to read off a log.

use tracing_subscriber::fmt::time::Uptime;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` wins, then `default_level`, then `info`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialises the global subscriber.  Later calls are ignored.
pub fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_timer(Uptime::default())
        .with_target(false)
        .try_init();
}
