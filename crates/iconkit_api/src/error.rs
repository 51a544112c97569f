//! Error types for API providers and queries.

use thiserror::Error;

/// Error type for provider configuration.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Provider configuration is malformed.
    #[error("Invalid provider config: {0}")]
    InvalidConfig(String),

    /// Provider name is not a valid name segment.
    #[error("Invalid provider name: {0}")]
    InvalidProvider(String),
}

/// Error type for a dispatched query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No configuration is registered for the provider.
    #[error("Unknown API provider: {0:?}")]
    UnknownProvider(String),

    /// A host reported that the icon set does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every configured host failed.
    #[error("All {attempts} hosts failed, last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
}

impl DispatchError {
    /// Returns true when retrying the same query cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::UnknownProvider(_) | Self::NotFound(_))
    }
}
