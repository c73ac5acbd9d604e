//! # Logging & Tracing Infrastructure
//!
//! Configures the `tracing-subscriber` stack for the sync core:
//! - Pretty-print or JSON output formats
//! - Module-level filtering via `RUST_LOG`-style directives
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::default().with_format(LogFormat::Pretty);
//! init_logging(&config).expect("Failed to initialize logging");
//!
//! tracing::info!("engine started");
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, RuntimeError};

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output, for development
    #[default]
    Pretty,
    /// Newline-delimited JSON, for ingestion pipelines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `"info,core_sync=debug"`.
    ///
    /// The `RUST_LOG` environment variable takes precedence when set.
    pub filter: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns `RuntimeError::LoggingInit` if a global subscriber is already
/// installed or the filter directives cannot be parsed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| RuntimeError::LoggingInit(e.to_string()))?;

    let builder = fmt().with_env_filter(filter);

    match config.format {
        LogFormat::Pretty => builder
            .try_init()
            .map_err(|e| RuntimeError::LoggingInit(e.to_string()))?,
        LogFormat::Json => builder
            .json()
            .try_init()
            .map_err(|e| RuntimeError::LoggingInit(e.to_string()))?,
    }

    Ok(())
}
