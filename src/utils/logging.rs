//! Structured logging and security-focused trace utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities to prevent
//! provider API keys from leaking into logs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{PilotError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for machine ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    // Configure filter from environment or config file
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PilotError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
    };

    installed.map_err(|e| PilotError::Internal(format!("Failed to install log subscriber: {}", e)))
}

fn secret_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:Bearer\s+[A-Za-z0-9._~+/=\-]+|\bsk-[A-Za-z0-9_\-*]{6,}|\bsk[A-Za-z0-9]{20,})")
            .expect("Invalid regex pattern")
    })
}

/// Sanitizes sensitive information from log messages.
///
/// Provider keys (`sk-...`, `sk-or-...`) and bearer credentials are replaced
/// with a `\[REDACTED\]` placeholder. Provider error bodies sometimes echo the
/// key that was sent, so they pass through here before being logged.
pub fn sanitize(input: &str) -> String {
    secret_regex().replace_all(input, "[REDACTED]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_api_keys() {
        let input = "Incorrect API key provided: sk-proj-abcdef123456. You can find your key...";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("abcdef123456"));
        assert!(output.ends_with("You can find your key..."));

        let output = sanitize("key sk-or-v1-0123456789abcdef rejected");
        assert_eq!(output, "key [REDACTED] rejected");
    }

    #[test]
    fn test_sanitize_bearer_header() {
        let output = sanitize("Authorization: Bearer abc.def-123");
        assert_eq!(output, "Authorization: [REDACTED]");
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        let input = "skip the sky, ask- questions";
        assert_eq!(sanitize(input), input);
    }
}
