use thiserror::Error;

/// Top-level error type for the Pulse gateway.
///
/// Subsystem crates define their own error types for their bounded context
/// and convert into `PulseError` where a failure has to cross into the
/// composition root (startup, config, storage).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PulseError {
    fn from(err: toml::de::Error) -> Self {
        PulseError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PulseError {
    fn from(err: toml::ser::Error) -> Self {
        PulseError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Pulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;
