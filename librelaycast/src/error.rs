//! Error types for Relaycast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

impl RelayError {
    /// Returns the process exit code for this error
    ///
    /// Configuration problems exit with 2 so cron wrappers can tell a broken
    /// setup apart from a transient runtime failure. `Source` and `Sink` only
    /// reach a binary when an HTTP client cannot be built.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Config(_) => 2,
            RelayError::State(_) => 1,
            RelayError::Source(_) => 1,
            RelayError::Sink(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("State lock unavailable: {0}")]
    Lock(String),
}

/// Failures talking to the upstream post source
///
/// Only [`SourceError::RateLimit`] is retried; every other kind ends the
/// fetch for the current account.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SourceError::RateLimit(_))
    }
}

#[derive(Error, Debug, Clone)]
pub enum SinkError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected by destination: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}
