//! Logging bootstrap.
//!
//! The library itself only emits through `tracing` macros; embedding
//! applications either install their own subscriber or call [`init`] once.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Environment variable overriding the configured filter.
const LOG_ENV: &str = "GIT_STORAGE_LOG";

/// Install a global fmt subscriber from the logging config. Safe to call
/// more than once; later calls lose to whichever subscriber is already
/// installed.
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(logging.filter.as_deref().unwrap_or("info"))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let result = if logging.stdout {
        builder.try_init()
    } else {
        builder.with_writer(std::io::sink).try_init()
    };
    if result.is_err() {
        tracing::debug!("telemetry already initialized, keeping existing subscriber");
    }
}
