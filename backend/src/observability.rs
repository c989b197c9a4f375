//! Logging setup and span helpers
//!
//! Library code only emits `tracing` events; binaries (the CLI, the
//! Python extension) decide where they go by calling [`init_logging`].

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, for log shippers
    Json,
    /// Human-readable
    #[default]
    Pretty,
}

/// Install the global subscriber
///
/// Filtering follows `RUST_LOG` (default `info`). Safe to call more than
/// once; only the first call has an effect, and a subscriber installed
/// by someone else is left in place.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let installed = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("global subscriber already set");
        }
    });
}

/// Span covering one run attempt of a scenario
#[must_use]
pub fn run_span(scenario: &str, start: i32, end: i32) -> Span {
    tracing::info_span!("run", scenario = scenario, start = start, end = end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn test_run_span_enters() {
        let span = run_span("baseline", 2025, 2029);
        let _guard = span.enter();
        tracing::info!("inside run span");
    }
}
