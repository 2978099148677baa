// crates/ruleplane-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: Installs the process-wide tracing subscriber.
// Purpose: Route library log events to stderr in text or JSON form.
// Dependencies: tracing-subscriber, ruleplane-config
// ============================================================================

//! ## Overview
//! Logs always go to stderr so stdout stays reserved for JSON results. A
//! `RUST_LOG` value that parses overrides the configured filter.

use ruleplane_config::LogFormat;
use ruleplane_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "RUST_LOG";

/// Errors raised while installing logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured filter directives did not parse.
    #[error("invalid log filter {filter:?}: {message}")]
    Filter {
        /// Rejected directives.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber was already installed.
    #[error("subscriber install failed: {0}")]
    Install(String),
}

/// Chooses the effective filter: a parseable `env_override`, else `configured`.
///
/// # Errors
///
/// Returns [`LoggingError::Filter`] when `configured` is needed and invalid.
pub fn resolve_filter(
    configured: &str,
    env_override: Option<&str>,
) -> Result<EnvFilter, LoggingError> {
    if let Some(directives) = env_override
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return Ok(filter);
    }
    EnvFilter::try_new(configured).map_err(|err| LoggingError::Filter {
        filter: configured.to_string(),
        message: err.to_string(),
    })
}

/// Installs the global subscriber for the process.
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn init_logging(
    config: &LoggingConfig,
    env_override: Option<&str>,
) -> Result<(), LoggingError> {
    let filter = resolve_filter(&config.filter, env_override)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn env_override_wins_when_valid() {
        let filter = resolve_filter("info", Some("ruleplane_store_sqlite=debug")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn invalid_env_override_falls_back_to_config() {
        let filter = resolve_filter("warn", Some("ruleplane=loud")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn invalid_configured_filter_is_rejected() {
        let err = resolve_filter("ruleplane=loud", None).unwrap_err();
        assert!(matches!(err, LoggingError::Filter { .. }));
    }
}
