//! Cache error types.

use thiserror::Error;

/// Storage failure inside the cache.
///
/// Read and write paths log these and carry on as a miss or a no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Stored entry does not hold a valid icon set.
    #[error("Corrupted cache entry: {0}")]
    Corrupted(String),

    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The platform has no cache directory.
    #[error("No cache directory available")]
    DirResolutionFailed,
}

impl CacheError {
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
