//! Tracing subscriber setup for the `autofocus` CLI.
//!
//! Log lines go to stderr so that command output on stdout stays parseable.
//! `RUST_LOG` overrides the configured level, e.g.
//! `RUST_LOG=autofocus_driver_prior=trace` shows every command and response
//! line exchanged with the controller.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Multi-line, colored (interactive use)
    Pretty,
    /// One line per event, no colors
    Compact,
    /// Newline-delimited JSON (log aggregation)
    Json,
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: OutputFormat,
    /// Emit span open/close events
    pub with_span_events: bool,
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_span_events: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// Idempotent: if a subscriber is already installed this returns `Ok(())`.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_ansi(config.with_ansi)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_ansi(false)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(env_filter))
        .try_init()
        .or_else(|e| {
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {}", e))
            }
        })
}

/// Parse a log level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("Debug"), Ok(Level::DEBUG));
        assert_eq!(parse_log_level("WARN"), Ok(Level::WARN));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = LoggingConfig::new(Level::DEBUG)
            .with_format(OutputFormat::Json)
            .with_span_events(true);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.with_span_events);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }
}
