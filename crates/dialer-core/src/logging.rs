//! Logging setup for dialer binaries
//!
//! The `[logging]` section of the configuration file is parsed into
//! [`LoggingSettings`](crate::config::LoggingSettings) and resolved here into
//! a [`LoggingConfig`] with a real [`Level`] before the subscriber goes in.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::{DialerError, DialerResult};

/// Resolved subscriber options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per line instead of the human-readable format
    pub json: bool,
    /// Source file and line on every record
    pub file_info: bool,
    /// Emit enter/exit records for the per-call spans
    pub spans: bool,
}

impl TryFrom<&LoggingSettings> for LoggingConfig {
    type Error = DialerError;

    fn try_from(settings: &LoggingSettings) -> DialerResult<Self> {
        Ok(LoggingConfig {
            level: parse_log_level(&settings.level)?,
            json: settings.json,
            file_info: settings.file_info,
            spans: settings.spans,
        })
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` directives are honoured and the configured level is added on
/// top. Calling this twice is an error rather than a panic.
pub fn setup_logging(config: LoggingConfig) -> DialerResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_writer(std::io::stderr)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| DialerError::internal(format!("failed to install logger: {e}")))?;

    tracing::info!(version = crate::VERSION, "Dialer logging ready");
    Ok(())
}

/// Parse a log level, ignoring case and surrounding whitespace
pub fn parse_log_level(level: &str) -> DialerResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| DialerError::config("logging.level", format!("invalid log level: {level}")))
}
