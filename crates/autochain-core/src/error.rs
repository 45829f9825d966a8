use thiserror::Error;

/// Top-level error type shared by the autochain crates.
///
/// Subsystem crates define their own error enums and wrap this one where
/// they touch configuration or serialization, so `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AutochainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for AutochainError {
    fn from(err: toml::de::Error) -> Self {
        AutochainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AutochainError {
    fn from(err: toml::ser::Error) -> Self {
        AutochainError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AutochainError {
    fn from(err: serde_json::Error) -> Self {
        AutochainError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for autochain operations.
pub type Result<T> = std::result::Result<T, AutochainError>;
