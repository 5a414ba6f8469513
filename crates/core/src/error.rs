//! Core error types

use thiserror::Error;

/// Core error type for devsec
#[derive(Debug, Error)]
pub enum CoreError {
    /// Device identifier string could not be parsed
    #[error("Invalid device identifier: {0}")]
    InvalidIdentifier(String),

    /// Encoded value outside its defined range
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Configuration value rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
