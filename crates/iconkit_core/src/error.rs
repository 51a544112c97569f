//! Core error types.

use iconkit_types::NameError;
use thiserror::Error;

/// Errors returned when loading a single icon.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The icon name could not be parsed.
    #[error("Invalid icon name: {0}")]
    InvalidName(#[from] NameError),

    /// The icon could not be loaded from any source.
    #[error("Icon not found: {0}")]
    NotFound(String),
}

/// Errors that can occur while reading library configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// Configuration is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Parse(String),

    /// Configuration does not match the schema.
    #[error("Config validation failed: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
