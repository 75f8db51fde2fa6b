//! Error types shared by every ops-sentinel crate.

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the remediation pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration; fatal at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A metric sample is missing a required metric field
    #[error("Metric point is missing required metric '{0}'")]
    MissingMetric(String),

    /// Durable log could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether this error stems from invalid configuration
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Yaml(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::config("x"), Error::Config(_)));
        assert!(matches!(Error::validation("x"), Error::Validation(_)));
        assert!(matches!(Error::storage("x"), Error::Storage(_)));
    }

    #[test]
    fn test_display() {
        let err = Error::MissingMetric("cpu".to_string());
        assert_eq!(err.to_string(), "Metric point is missing required metric 'cpu'");
        assert!(Error::config("window_size must be >= 5").is_config());
        assert!(!Error::validation("bad").is_config());
    }
}
