//! Logging setup shared by the Relaycast binaries
//!
//! All output goes to stderr so cron captures it alongside the exit status.
//! The format and level come from `RELAYCAST_LOG_FORMAT` (text, json, pretty)
//! and `RELAYCAST_LOG_LEVEL`; `RUST_LOG` still wins when set, since it can
//! carry per-module directives.
//!
//! ```no_run
//! use librelaycast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "debug").init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain single-line output
    #[default]
    Text,
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line colored output for local debugging
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Read `RELAYCAST_LOG_FORMAT` and `RELAYCAST_LOG_LEVEL`
    ///
    /// An unparseable format falls back to text rather than aborting a run
    /// over a logging typo.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RELAYCAST_LOG_FORMAT").ok().as_deref(),
            std::env::var("RELAYCAST_LOG_LEVEL").ok().as_deref(),
        )
    }

    fn from_vars(format: Option<&str>, level: Option<&str>) -> Self {
        let format = format.and_then(|s| s.parse().ok()).unwrap_or_default();
        let level = level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or("info")
            .to_string();
        Self { format, level }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber
    ///
    /// Returns false if a subscriber was already installed (tests, or a
    /// second call), instead of panicking.
    pub fn init(&self) -> bool {
        let filter = self.filter();

        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false)
                .try_init(),
        };

        result.is_ok()
    }
}

/// Initialize logging from the environment
pub fn init_default() {
    LoggingConfig::from_env().init();
}
