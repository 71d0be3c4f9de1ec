//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Misses are never errors;
//! only construction can fail on the cache side.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache construction.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Background cleanup thread could not be started
    #[error("Failed to start cleanup thread: {0}")]
    Sweeper(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
