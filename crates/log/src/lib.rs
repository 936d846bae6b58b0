//! # Fleet Log
//!
//! A single entry point for bootstrapping `tracing` the same way across the
//! CLI binary and any future daemon — so a node handler logging through
//! `tracing::info!` looks the same everywhere this workspace runs.
//!
//! Mirrors the shape of the teacher's `nebula-log` crate (an `EnvFilter` +
//! `fmt` layer, with an optional JSON formatter) scaled down to what this
//! workspace actually needs: no file rotation, no OpenTelemetry export, no
//! Sentry integration — those remain genuine ambient-stack candidates for a
//! production deployment, not something this exercise's scope calls for.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Output format for the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, ANSI-colored lines (default, good for a terminal).
    #[default]
    Pretty,
    /// Newline-delimited JSON (good for shipping to a log aggregator).
    Json,
}

/// Configuration for [`init`].
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// Default filter directive used when `RUST_LOG` is unset, e.g. `"info"`.
    pub default_filter: String,
}

impl LogConfig {
    /// Build a config with a given default filter and [`LogFormat::Pretty`].
    #[must_use]
    pub fn with_default_filter(default_filter: impl Into<String>) -> Self {
        Self {
            format: LogFormat::Pretty,
            default_filter: default_filter.into(),
        }
    }
}

/// Install a global `tracing` subscriber built from `config`.
///
/// Respects `RUST_LOG` when set; otherwise falls back to
/// `config.default_filter` (or `"info"` if that's empty). Calling this more
/// than once in a process returns an error from the underlying
/// `tracing_subscriber` registry rather than panicking — callers that only
/// want "log if not already initialized" (e.g. tests) should ignore the
/// `Err` case.
pub fn init(config: LogConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter_source = if config.default_filter.is_empty() {
        "info".to_string()
    } else {
        config.default_filter.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_source));

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().with_ansi(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    }
}

/// Initialize with sane defaults (`info`, pretty format), ignoring the error
/// if a subscriber is already installed. Intended for test setup.
pub fn init_test_default() {
    let _ = init(LogConfig::with_default_filter("warn"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_pretty_format() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn with_default_filter_sets_value() {
        let config = LogConfig::with_default_filter("debug");
        assert_eq!(config.default_filter, "debug");
    }

    #[test]
    fn init_test_default_does_not_panic_when_called_twice() {
        init_test_default();
        init_test_default();
    }
}
