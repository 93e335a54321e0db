// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.
//!
//! Installs a global `tracing` subscriber from a [`LoggingConfig`]. The
//! `RUST_LOG` environment variable, when set, overrides the configured level.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use uasrv_config::{LogFormat, LogLevel, LoggingConfig};

// =============================================================================
// Logging Initialization
// =============================================================================

/// Initializes the logging subsystem.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use uasrv_config::LoggingConfig;
/// use uasrv_server::logging::init_logging;
///
/// init_logging(&LoggingConfig::default())?;
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = build_filter(config.level);

    match config.format {
        LogFormat::Text => init_text_logging(filter, config),
        LogFormat::Json => init_json_logging(filter, config),
        LogFormat::Compact => init_compact_logging(filter, config),
    }
}

/// Builds the filter: `RUST_LOG` if set, the configured level otherwise.
pub fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initializes text-based logging (default).
fn init_text_logging(filter: EnvFilter, config: &LoggingConfig) -> Result<(), TryInitError> {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_thread_names(config.with_thread_ids)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(is_terminal),
        )
        .try_init()
}

/// Initializes JSON logging (for log aggregation).
fn init_json_logging(filter: EnvFilter, config: &LoggingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init()
}

/// Initializes compact logging (minimal output).
fn init_compact_logging(filter: EnvFilter, config: &LoggingConfig) -> Result<(), TryInitError> {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(config.with_thread_ids)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(is_terminal),
        )
        .try_init()
}

// =============================================================================
// Log Level Conversion
// =============================================================================

/// Converts a configured level into a `tracing` level.
pub fn to_tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_tracing_level() {
        assert_eq!(to_tracing_level(LogLevel::Trace), Level::TRACE);
        assert_eq!(to_tracing_level(LogLevel::Warn), Level::WARN);
        assert_eq!(to_tracing_level(LogLevel::default()), Level::INFO);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            format: LogFormat::Compact,
            ..Default::default()
        };
        // Another test may already have installed a subscriber.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
